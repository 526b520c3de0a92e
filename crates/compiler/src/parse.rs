use crate::CompileError;
use crate::ast::{
    Arg, BinaryOp, CatchCodes, CondArm, ExceptArm, Expr, Program, ScatterItem, ScatterKind, Stmt,
    StmtNode, UnaryOp,
};
use crate::lex::{SpannedTok, Tok};
use warren_var::{SYSTEM_OBJECT, Symbol, v_float, v_int, v_obj, v_str};

/// Binding powers, loosest first. Assignment is right-associative; postfix
/// operations (index, property, verb call) bind tighter than any of these.
const BP_ASSIGN: u8 = 1;
const BP_COND: u8 = 2;
const BP_OR: u8 = 3;
const BP_AND: u8 = 4;
const BP_COMPARE: u8 = 5;
const BP_ADD: u8 = 6;
const BP_MUL: u8 = 7;

pub fn parse_program(tokens: Vec<SpannedTok>) -> Result<Program, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        index_depth: 0,
    };
    let stmts = parser.parse_stmts(&[])?;
    if !matches!(parser.peek(), Tok::Eof) {
        return Err(parser.error("unexpected trailing tokens"));
    }
    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<SpannedTok>,
    pos: usize,
    index_depth: usize,
}

enum BraceElem {
    Arg(Arg),
    Optional(Symbol, Option<Expr>),
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn next(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: &str) -> CompileError {
        CompileError::ParseError {
            line: self.line(),
            message: message.to_string(),
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), CompileError> {
        if *self.peek() == tok {
            self.next();
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), CompileError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{kw}', found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<Symbol, CompileError> {
        match self.next() {
            Tok::Ident(s) => Ok(Symbol::mk(&s)),
            other => Err(CompileError::ParseError {
                line: self.line(),
                message: format!("expected identifier, found {other:?}"),
            }),
        }
    }

    /// Parse statements until one of `terminators` (not consumed) or EOF.
    fn parse_stmts(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = vec![];
        loop {
            if matches!(self.peek(), Tok::Eof) {
                if terminators.is_empty() {
                    return Ok(stmts);
                }
                return Err(self.error(&format!(
                    "unexpected end of program; expected one of {terminators:?}"
                )));
            }
            if terminators.iter().any(|t| self.peek_keyword(t)) {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        if self.eat_keyword("if") {
            return self.parse_if(line);
        }
        if self.eat_keyword("for") {
            return self.parse_for(line);
        }
        if self.eat_keyword("while") {
            self.expect(Tok::LParen, "'('")?;
            let condition = self.parse_expr(0)?;
            self.expect(Tok::RParen, "')'")?;
            let body = self.parse_stmts(&["endwhile"])?;
            self.expect_keyword("endwhile")?;
            return Ok(Stmt::new(StmtNode::While { condition, body }, line));
        }
        if self.eat_keyword("try") {
            return self.parse_try(line);
        }
        if self.eat_keyword("break") {
            self.expect(Tok::Semicolon, "';'")?;
            return Ok(Stmt::new(StmtNode::Break, line));
        }
        if self.eat_keyword("continue") {
            self.expect(Tok::Semicolon, "';'")?;
            return Ok(Stmt::new(StmtNode::Continue, line));
        }
        if self.eat_keyword("return") {
            let expr = if matches!(self.peek(), Tok::Semicolon) {
                None
            } else {
                Some(self.parse_expr(0)?)
            };
            self.expect(Tok::Semicolon, "';'")?;
            return Ok(Stmt::new(StmtNode::Return(expr), line));
        }
        if self.peek_keyword("fork") {
            return Err(self.error("fork statements are not supported"));
        }
        let expr = self.parse_expr(0)?;
        self.expect(Tok::Semicolon, "';'")?;
        Ok(Stmt::new(StmtNode::Expr(expr), line))
    }

    fn parse_if(&mut self, line: usize) -> Result<Stmt, CompileError> {
        let mut arms = vec![];
        self.expect(Tok::LParen, "'('")?;
        let condition = self.parse_expr(0)?;
        self.expect(Tok::RParen, "')'")?;
        let statements = self.parse_stmts(&["elseif", "else", "endif"])?;
        arms.push(CondArm {
            condition,
            statements,
        });
        let mut otherwise = vec![];
        loop {
            if self.eat_keyword("elseif") {
                self.expect(Tok::LParen, "'('")?;
                let condition = self.parse_expr(0)?;
                self.expect(Tok::RParen, "')'")?;
                let statements = self.parse_stmts(&["elseif", "else", "endif"])?;
                arms.push(CondArm {
                    condition,
                    statements,
                });
            } else if self.eat_keyword("else") {
                otherwise = self.parse_stmts(&["endif"])?;
                self.expect_keyword("endif")?;
                break;
            } else {
                self.expect_keyword("endif")?;
                break;
            }
        }
        Ok(Stmt::new(StmtNode::Cond { arms, otherwise }, line))
    }

    fn parse_for(&mut self, line: usize) -> Result<Stmt, CompileError> {
        let id = self.expect_ident()?;
        self.expect_keyword("in")?;
        match self.next() {
            Tok::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Tok::RParen, "')'")?;
                let body = self.parse_stmts(&["endfor"])?;
                self.expect_keyword("endfor")?;
                Ok(Stmt::new(StmtNode::ForList { id, expr, body }, line))
            }
            Tok::LBracket => {
                let from = self.parse_expr(0)?;
                self.expect(Tok::DotDot, "'..'")?;
                let to = self.parse_expr(0)?;
                self.expect(Tok::RBracket, "']'")?;
                let body = self.parse_stmts(&["endfor"])?;
                self.expect_keyword("endfor")?;
                Ok(Stmt::new(StmtNode::ForRange { id, from, to, body }, line))
            }
            _ => Err(self.error("expected '(' or '[' after 'for x in'")),
        }
    }

    fn parse_try(&mut self, line: usize) -> Result<Stmt, CompileError> {
        let body = self.parse_stmts(&["except", "finally"])?;
        if self.eat_keyword("finally") {
            let handler = self.parse_stmts(&["endtry"])?;
            self.expect_keyword("endtry")?;
            return Ok(Stmt::new(StmtNode::TryFinally { body, handler }, line));
        }
        let mut excepts = vec![];
        while self.eat_keyword("except") {
            let id = if matches!(self.peek(), Tok::Ident(_)) && !self.peek_keyword("any") {
                Some(self.expect_ident()?)
            } else {
                None
            };
            self.expect(Tok::LParen, "'('")?;
            let codes = self.parse_catch_codes()?;
            self.expect(Tok::RParen, "')'")?;
            let statements = self.parse_stmts(&["except", "endtry"])?;
            excepts.push(ExceptArm {
                id,
                codes,
                statements,
            });
        }
        if excepts.is_empty() {
            return Err(self.error("try statement with neither except nor finally"));
        }
        self.expect_keyword("endtry")?;
        Ok(Stmt::new(StmtNode::TryExcept { body, excepts }, line))
    }

    /// The codes of an except arm or catch expression: `ANY` or an
    /// expression list (splices allowed).
    fn parse_catch_codes(&mut self) -> Result<CatchCodes, CompileError> {
        if self.eat_keyword("any") {
            return Ok(CatchCodes::Any);
        }
        let mut codes = vec![];
        loop {
            codes.push(self.parse_arg()?);
            if *self.peek() == Tok::Comma {
                self.next();
                continue;
            }
            break;
        }
        Ok(CatchCodes::Codes(codes))
    }

    fn parse_arg(&mut self) -> Result<Arg, CompileError> {
        if *self.peek() == Tok::At {
            self.next();
            Ok(Arg::Splice(self.parse_expr(BP_ASSIGN)?))
        } else {
            Ok(Arg::Normal(self.parse_expr(BP_ASSIGN)?))
        }
    }

    /// A parenthesized argument list, after the '(' has been consumed.
    fn parse_arglist(&mut self) -> Result<Vec<Arg>, CompileError> {
        let mut args = vec![];
        if *self.peek() == Tok::RParen {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_arg()?);
            match self.next() {
                Tok::Comma => continue,
                Tok::RParen => break,
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
        Ok(args)
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Assign if min_bp <= BP_ASSIGN => {
                    self.next();
                    let right = self.parse_expr(BP_ASSIGN)?;
                    lhs = self.make_assign(lhs, right)?;
                    continue;
                }
                Tok::Question if min_bp <= BP_COND => {
                    self.next();
                    let consequence = self.parse_expr(0)?;
                    self.expect(Tok::Pipe, "'|'")?;
                    let alternative = self.parse_expr(BP_COND)?;
                    lhs = Expr::Cond {
                        condition: Box::new(lhs),
                        consequence: Box::new(consequence),
                        alternative: Box::new(alternative),
                    };
                    continue;
                }
                Tok::OrOr if min_bp <= BP_OR => {
                    self.next();
                    let rhs = self.parse_expr(BP_OR + 1)?;
                    lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
                    continue;
                }
                Tok::AndAnd if min_bp <= BP_AND => {
                    self.next();
                    let rhs = self.parse_expr(BP_AND + 1)?;
                    lhs = Expr::And(Box::new(lhs), Box::new(rhs));
                    continue;
                }
                Tok::Eq if min_bp <= BP_COMPARE => Some((BinaryOp::Eq, BP_COMPARE)),
                Tok::NEq if min_bp <= BP_COMPARE => Some((BinaryOp::NEq, BP_COMPARE)),
                Tok::Lt if min_bp <= BP_COMPARE => Some((BinaryOp::Lt, BP_COMPARE)),
                Tok::LtE if min_bp <= BP_COMPARE => Some((BinaryOp::LtE, BP_COMPARE)),
                Tok::Gt if min_bp <= BP_COMPARE => Some((BinaryOp::Gt, BP_COMPARE)),
                Tok::GtE if min_bp <= BP_COMPARE => Some((BinaryOp::GtE, BP_COMPARE)),
                Tok::Ident(s)
                    if s.eq_ignore_ascii_case("in") && min_bp <= BP_COMPARE =>
                {
                    Some((BinaryOp::In, BP_COMPARE))
                }
                Tok::Plus if min_bp <= BP_ADD => Some((BinaryOp::Add, BP_ADD)),
                Tok::Minus if min_bp <= BP_ADD => Some((BinaryOp::Sub, BP_ADD)),
                Tok::Star if min_bp <= BP_MUL => Some((BinaryOp::Mul, BP_MUL)),
                Tok::Slash if min_bp <= BP_MUL => Some((BinaryOp::Div, BP_MUL)),
                Tok::Percent if min_bp <= BP_MUL => Some((BinaryOp::Mod, BP_MUL)),
                Tok::Caret if min_bp <= BP_MUL => Some((BinaryOp::Exp, BP_MUL)),
                _ => None,
            };
            let Some((op, bp)) = op else {
                return Ok(lhs);
            };
            self.next();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn make_assign(&self, left: Expr, right: Expr) -> Result<Expr, CompileError> {
        match left {
            Expr::Id(_) | Expr::Prop { .. } | Expr::Index(_, _) | Expr::Range { .. } => {
                Ok(Expr::Assign {
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            Expr::List(args) => {
                let mut items = vec![];
                for arg in args {
                    let item = match arg {
                        Arg::Normal(Expr::Id(id)) => ScatterItem {
                            kind: ScatterKind::Required,
                            id,
                            expr: None,
                        },
                        Arg::Splice(Expr::Id(id)) => ScatterItem {
                            kind: ScatterKind::Rest,
                            id,
                            expr: None,
                        },
                        _ => {
                            return Err(self
                                .error("only variables may appear in a scattering assignment"));
                        }
                    };
                    items.push(item);
                }
                Ok(Expr::Scatter(items, Box::new(right)))
            }
            Expr::Scatter(items, _) => {
                // `{...} = a = b` re-targets the already-built scatter.
                Ok(Expr::Scatter(items, Box::new(right)))
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Tok::Minus => {
                self.next();
                let e = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(e)))
            }
            Tok::Bang => {
                self.next();
                let e = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(e)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.next();
                    let property = if *self.peek() == Tok::LParen {
                        self.next();
                        let e = self.parse_expr(0)?;
                        self.expect(Tok::RParen, "')'")?;
                        e
                    } else {
                        let name = self.expect_ident()?;
                        Expr::Value(v_str(name.as_str()))
                    };
                    expr = Expr::Prop {
                        location: Box::new(expr),
                        property: Box::new(property),
                    };
                }
                Tok::Colon => {
                    self.next();
                    let verb = if *self.peek() == Tok::LParen {
                        self.next();
                        let e = self.parse_expr(0)?;
                        self.expect(Tok::RParen, "')'")?;
                        e
                    } else {
                        let name = self.expect_ident()?;
                        Expr::Value(v_str(name.as_str()))
                    };
                    self.expect(Tok::LParen, "'('")?;
                    let args = self.parse_arglist()?;
                    expr = Expr::Verb {
                        location: Box::new(expr),
                        verb: Box::new(verb),
                        args,
                    };
                }
                Tok::LBracket => {
                    self.next();
                    self.index_depth += 1;
                    let first = self.parse_expr(0)?;
                    if *self.peek() == Tok::DotDot {
                        self.next();
                        let second = self.parse_expr(0)?;
                        self.index_depth -= 1;
                        self.expect(Tok::RBracket, "']'")?;
                        expr = Expr::Range {
                            base: Box::new(expr),
                            from: Box::new(first),
                            to: Box::new(second),
                        };
                    } else {
                        self.index_depth -= 1;
                        self.expect(Tok::RBracket, "']'")?;
                        expr = Expr::Index(Box::new(expr), Box::new(first));
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        match self.next() {
            Tok::Int(i) => Ok(Expr::Value(v_int(i))),
            Tok::Float(f) => Ok(Expr::Value(v_float(f))),
            Tok::Str(s) => Ok(Expr::Value(v_str(&s))),
            Tok::ObjLit(id) => Ok(Expr::Value(v_obj(warren_var::Obj::mk_id(id)))),
            Tok::Ident(name) => {
                if name.eq_ignore_ascii_case("pass") && *self.peek() == Tok::LParen {
                    self.next();
                    let args = self.parse_arglist()?;
                    return Ok(Expr::Pass { args });
                }
                if *self.peek() == Tok::LParen {
                    self.next();
                    let args = self.parse_arglist()?;
                    return Ok(Expr::Call {
                        function: Symbol::mk(&name),
                        args,
                    });
                }
                Ok(Expr::Id(Symbol::mk(&name)))
            }
            Tok::Dollar => {
                if let Tok::Ident(_) = self.peek() {
                    let name = self.expect_ident()?;
                    Ok(Expr::Prop {
                        location: Box::new(Expr::Value(v_obj(SYSTEM_OBJECT))),
                        property: Box::new(Expr::Value(v_str(name.as_str()))),
                    })
                } else if self.index_depth > 0 {
                    Ok(Expr::Length)
                } else {
                    Err(self.error("'$' is only meaningful inside an index"))
                }
            }
            Tok::LParen => {
                let e = self.parse_expr(0)?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBrace => self.parse_braces(),
            Tok::Backquote => {
                let trye = self.parse_expr(0)?;
                self.expect(Tok::Bang, "'!'")?;
                let codes = self.parse_catch_codes()?;
                let except = if *self.peek() == Tok::Arrow {
                    self.next();
                    Some(Box::new(self.parse_expr(0)?))
                } else {
                    None
                };
                self.expect(Tok::Quote, "closing \"'\"")?;
                Ok(Expr::Catch {
                    trye: Box::new(trye),
                    codes,
                    except,
                })
            }
            other => Err(CompileError::ParseError {
                line: self.line(),
                message: format!("unexpected token {other:?}"),
            }),
        }
    }

    /// A brace form: either a list literal or (when followed by `=`) a
    /// scattering assignment target.
    fn parse_braces(&mut self) -> Result<Expr, CompileError> {
        let mut elems = vec![];
        if *self.peek() == Tok::RBrace {
            self.next();
        } else {
            loop {
                let elem = match self.peek() {
                    Tok::Question => {
                        self.next();
                        let id = self.expect_ident()?;
                        let default = if *self.peek() == Tok::Assign {
                            self.next();
                            Some(self.parse_expr(BP_ASSIGN)?)
                        } else {
                            None
                        };
                        BraceElem::Optional(id, default)
                    }
                    Tok::At => {
                        self.next();
                        BraceElem::Arg(Arg::Splice(self.parse_expr(BP_ASSIGN)?))
                    }
                    _ => BraceElem::Arg(Arg::Normal(self.parse_expr(BP_ASSIGN)?)),
                };
                elems.push(elem);
                match self.next() {
                    Tok::Comma => continue,
                    Tok::RBrace => break,
                    _ => return Err(self.error("expected ',' or '}' in list")),
                }
            }
        }

        if *self.peek() == Tok::Assign {
            self.next();
            let mut items = vec![];
            for elem in elems {
                let item = match elem {
                    BraceElem::Optional(id, expr) => ScatterItem {
                        kind: ScatterKind::Optional,
                        id,
                        expr,
                    },
                    BraceElem::Arg(Arg::Normal(Expr::Id(id))) => ScatterItem {
                        kind: ScatterKind::Required,
                        id,
                        expr: None,
                    },
                    BraceElem::Arg(Arg::Splice(Expr::Id(id))) => ScatterItem {
                        kind: ScatterKind::Rest,
                        id,
                        expr: None,
                    },
                    BraceElem::Arg(_) => {
                        return Err(
                            self.error("only variables may appear in a scattering assignment")
                        );
                    }
                };
                items.push(item);
            }
            let right = self.parse_expr(BP_ASSIGN)?;
            return Ok(Expr::Scatter(items, Box::new(right)));
        }

        let mut args = vec![];
        for elem in elems {
            match elem {
                BraceElem::Arg(a) => args.push(a),
                BraceElem::Optional(_, _) => {
                    return Err(self.error("'?' targets are only legal in scattering assignments"));
                }
            }
        }
        Ok(Expr::List(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> Program {
        compile(s).unwrap()
    }

    fn parse_expr_stmt(s: &str) -> Expr {
        let p = parse(s);
        assert_eq!(p.stmts.len(), 1, "expected a single statement");
        match &p.stmts[0].node {
            StmtNode::Expr(e) => e.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        let e = parse_expr_stmt("1 + 2 * 3;");
        assert_eq!(
            e,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Value(v_int(1))),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Value(v_int(2))),
                    Box::new(Expr::Value(v_int(3))),
                )),
            )
        );
    }

    #[test]
    fn and_or_short_circuit_shape() {
        let e = parse_expr_stmt("a && b || c;");
        assert_eq!(
            e,
            Expr::Or(
                Box::new(Expr::And(
                    Box::new(Expr::Id(Symbol::mk("a"))),
                    Box::new(Expr::Id(Symbol::mk("b"))),
                )),
                Box::new(Expr::Id(Symbol::mk("c"))),
            )
        );
    }

    #[test]
    fn ternary() {
        let e = parse_expr_stmt("x ? 1 | 2;");
        assert_eq!(
            e,
            Expr::Cond {
                condition: Box::new(Expr::Id(Symbol::mk("x"))),
                consequence: Box::new(Expr::Value(v_int(1))),
                alternative: Box::new(Expr::Value(v_int(2))),
            }
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse_expr_stmt("a = b = 2;");
        let Expr::Assign { left, right } = e else {
            panic!("expected assignment");
        };
        assert_eq!(*left, Expr::Id(Symbol::mk("a")));
        let Expr::Assign { left, right } = *right else {
            panic!("expected nested assignment");
        };
        assert_eq!(*left, Expr::Id(Symbol::mk("b")));
        assert_eq!(*right, Expr::Value(v_int(2)));
    }

    #[test]
    fn index_and_range_with_length() {
        let e = parse_expr_stmt("s[2..$];");
        assert_eq!(
            e,
            Expr::Range {
                base: Box::new(Expr::Id(Symbol::mk("s"))),
                from: Box::new(Expr::Value(v_int(2))),
                to: Box::new(Expr::Length),
            }
        );
        assert!(compile("x = $;").is_err());
    }

    #[test]
    fn sysprop_and_dynamic_prop() {
        let e = parse_expr_stmt("$login;");
        assert_eq!(
            e,
            Expr::Prop {
                location: Box::new(Expr::Value(v_obj(SYSTEM_OBJECT))),
                property: Box::new(Expr::Value(v_str("login"))),
            }
        );
        let e = parse_expr_stmt("x.(\"na\" + \"me\");");
        let Expr::Prop { property, .. } = e else {
            panic!("expected property reference");
        };
        assert!(matches!(*property, Expr::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn verb_call_and_pass() {
        let e = parse_expr_stmt("player:tell(\"hi\", @rest);");
        let Expr::Verb { verb, args, .. } = e else {
            panic!("expected verb call");
        };
        assert_eq!(*verb, Expr::Value(v_str("tell")));
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1], Arg::Splice(_)));

        let e = parse_expr_stmt("pass(@args);");
        assert!(matches!(e, Expr::Pass { .. }));
    }

    #[test]
    fn catch_expression() {
        let e = parse_expr_stmt("`1 / 0 ! E_DIV => 42';");
        let Expr::Catch {
            codes, except, ..
        } = e
        else {
            panic!("expected catch expression");
        };
        let CatchCodes::Codes(codes) = codes else {
            panic!("expected code list");
        };
        assert_eq!(codes.len(), 1);
        assert_eq!(*except.unwrap(), Expr::Value(v_int(42)));

        let e = parse_expr_stmt("`x.y ! ANY';");
        let Expr::Catch { codes, except, .. } = e else {
            panic!("expected catch expression");
        };
        assert_eq!(codes, CatchCodes::Any);
        assert!(except.is_none());
    }

    #[test]
    fn scatter_assignment() {
        let e = parse_expr_stmt("{a, ?b, ?c = 10, @rest} = args;");
        let Expr::Scatter(items, _) = e else {
            panic!("expected scatter");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].kind, ScatterKind::Required);
        assert_eq!(items[1].kind, ScatterKind::Optional);
        assert!(items[1].expr.is_none());
        assert_eq!(items[2].kind, ScatterKind::Optional);
        assert_eq!(items[2].expr, Some(Expr::Value(v_int(10))));
        assert_eq!(items[3].kind, ScatterKind::Rest);
    }

    #[test]
    fn list_with_optional_marker_is_error() {
        assert!(compile("x = {?a};").is_err());
        assert!(compile("{1, 2} = x;").is_err());
    }

    #[test]
    fn if_elseif_else() {
        let p = parse("if (a) return 1; elseif (b) return 2; else return 3; endif");
        let StmtNode::Cond { arms, otherwise } = &p.stmts[0].node else {
            panic!("expected cond");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn loops() {
        let p = parse("for x in (l) s = s + x; endfor");
        assert!(matches!(p.stmts[0].node, StmtNode::ForList { .. }));
        let p = parse("for i in [1..10] n = n + i; endfor");
        assert!(matches!(p.stmts[0].node, StmtNode::ForRange { .. }));
        let p = parse("while (1) break; endwhile");
        let StmtNode::While { body, .. } = &p.stmts[0].node else {
            panic!("expected while");
        };
        assert!(matches!(body[0].node, StmtNode::Break));
    }

    #[test]
    fn try_except_and_finally() {
        let p = parse("try x = 1; except e (E_DIV, E_TYPE) y = 2; except (ANY) z = 3; endtry");
        let StmtNode::TryExcept { excepts, .. } = &p.stmts[0].node else {
            panic!("expected try/except");
        };
        assert_eq!(excepts.len(), 2);
        assert_eq!(excepts[0].id, Some(Symbol::mk("e")));
        assert_eq!(excepts[1].codes, CatchCodes::Any);

        let p = parse("try x = 1; finally y = 2; endtry");
        assert!(matches!(p.stmts[0].node, StmtNode::TryFinally { .. }));
    }

    #[test]
    fn fork_is_rejected() {
        assert!(compile("fork (5) x = 1; endfork").is_err());
    }

    #[test]
    fn line_numbers_track_statements() {
        let p = parse("x = 1;\ny = 2;\nz = 3;");
        assert_eq!(p.stmts[0].line, 1);
        assert_eq!(p.stmts[1].line, 2);
        assert_eq!(p.stmts[2].line, 3);
    }

    #[test]
    fn in_operator() {
        let e = parse_expr_stmt("x in {1, 2};");
        assert!(matches!(e, Expr::Binary(BinaryOp::In, _, _)));
    }

    #[test]
    fn unary_and_negation() {
        let e = parse_expr_stmt("-x + !y;");
        let Expr::Binary(BinaryOp::Add, l, r) = e else {
            panic!("expected addition");
        };
        assert!(matches!(*l, Expr::Unary(UnaryOp::Neg, _)));
        assert!(matches!(*r, Expr::Unary(UnaryOp::Not, _)));
    }
}
