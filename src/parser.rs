use crate::{
    ast::{
        BinaryOp, CastTarget, Clause, Constructor, Expr, ExprKind, Index, Item, Literal,
        Modifier, ModifierKind, Stmt, StmtKind, Target, TypeExpr, TypeTest, UnaryOp,
    },
    dates,
    diagnostics::{Diagnostic, ErrorCode, Provenance, SourceSpan},
    lexer::{tokenize, Keyword, Token, TokenKind},
};

/// Lexes and parses one line of source.
pub fn parse_source(source: &str) -> Result<(Vec<Token>, Stmt), Diagnostic> {
    let tokens = tokenize(source)?;
    let stmt = parse_line(source, &tokens)?;
    Ok((tokens, stmt))
}

/// Parses an already-lexed line. Grouping and `fa`/`fo` balance are checked
/// up front so that structural mistakes are reported at the offending token.
pub fn parse_line(source: &str, tokens: &[Token]) -> Result<Stmt, Diagnostic> {
    check_grouping(tokens)?;
    check_fallback_balance(tokens)?;
    Parser::new(source, tokens).parse_statement()
}

fn token_error(code: ErrorCode, index: usize, token: &Token) -> Diagnostic {
    Diagnostic::error(code)
        .with_span(token.span)
        .with_provenance(&Provenance::token(index))
}

fn check_grouping(tokens: &[Token]) -> Result<(), Diagnostic> {
    let mut open: Vec<(usize, TokenKind)> = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        let closing_for = match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                open.push((index, token.kind));
                continue;
            }
            TokenKind::RParen => TokenKind::LParen,
            TokenKind::RBracket => TokenKind::LBracket,
            TokenKind::RBrace => TokenKind::LBrace,
            _ => continue,
        };
        match open.pop() {
            Some((_, kind)) if kind == closing_for => {}
            _ => {
                return Err(token_error(ErrorCode::UnbalancedGrouping, index, token)
                    .with_str(token.kind.describe()))
            }
        }
    }
    match open.pop() {
        Some((index, kind)) => {
            Err(token_error(ErrorCode::UnbalancedGrouping, index, &tokens[index])
                .with_str(kind.describe()))
        }
        None => Ok(()),
    }
}

fn check_fallback_balance(tokens: &[Token]) -> Result<(), Diagnostic> {
    let mut depth = 0usize;
    let mut last_fa = None;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Keyword(Keyword::Fa) => {
                depth += 1;
                last_fa = Some(index);
            }
            TokenKind::Keyword(Keyword::Fo) => {
                if depth == 0 {
                    return Err(token_error(ErrorCode::UnbalancedFallback, index, token));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    match (depth, last_fa) {
        (0, _) | (_, None) => Ok(()),
        (_, Some(index)) => Err(token_error(
            ErrorCode::UnbalancedFallback,
            index,
            &tokens[index],
        )),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    current: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            source,
            tokens,
            current: 0,
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let span = self.line_span();
        if self.is_at_end() {
            return Ok(Stmt {
                kind: StmtKind::Empty,
                span,
            });
        }
        let kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Import) => self.parse_import()?,
            TokenKind::Keyword(Keyword::Assert) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_end()?;
                StmtKind::Assert(expr)
            }
            TokenKind::Macro => {
                let expr = self.parse_expression()?;
                if !self.is_at_end() || !matches!(expr.kind, ExprKind::Call { is_macro: true, .. })
                {
                    let first = &self.tokens[0];
                    return Err(token_error(ErrorCode::MacroPlacement, 0, first)
                        .with_str(first.lexeme.clone()));
                }
                StmtKind::Macro(expr)
            }
            _ => match self.try_declaration()? {
                Some(kind) => kind,
                None => {
                    self.current = 0;
                    let expr = self.parse_expression()?;
                    self.expect_end()?;
                    StmtKind::Expr(expr)
                }
            },
        };
        Ok(Stmt { kind, span })
    }

    fn parse_import(&mut self) -> Result<StmtKind, Diagnostic> {
        self.advance();
        let module = self.consume_target("a module name")?;
        self.expect_end()?;
        Ok(StmtKind::Import { module })
    }

    /// Recognises the declaration forms that start with names. Returns
    /// `None` (with the cursor to be reset) when the line is an expression.
    fn try_declaration(&mut self) -> Result<Option<StmtKind>, Diagnostic> {
        if let Some(kind) = self.try_function()? {
            return Ok(Some(kind));
        }
        self.current = 0;
        let mut targets = Vec::new();
        loop {
            if self.peek_kind() != TokenKind::Name {
                return Ok(None);
            }
            let token = self.advance().clone();
            targets.push(Target {
                name: token.lexeme,
                span: token.span,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        match self.peek_kind() {
            TokenKind::Assign => {
                self.advance();
                let values = self.parse_value_list()?;
                Ok(Some(StmtKind::Declare {
                    targets,
                    annotation: None,
                    values,
                }))
            }
            TokenKind::Shift if targets.len() == 1 => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_end()?;
                let target = targets.remove(0);
                Ok(Some(StmtKind::Append { target, value }))
            }
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let ty = self.parse_type_expr()?;
                if self.matches(TokenKind::Assign) {
                    let values = self.parse_value_list()?;
                    return Ok(Some(StmtKind::Declare {
                        targets,
                        annotation: Some(ty),
                        values,
                    }));
                }
                if ty.name == "Variable" && ty.element.is_none() && self.is_at_end() {
                    return Ok(Some(StmtKind::Variables(targets)));
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// `f(a, b) = body`
    fn try_function(&mut self) -> Result<Option<StmtKind>, Diagnostic> {
        if self.peek_kind() != TokenKind::Name || self.peek_kind_at(1) != TokenKind::LParen {
            return Ok(None);
        }
        let name = self.advance().clone();
        self.advance();
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if self.peek_kind() != TokenKind::Name {
                    return Ok(None);
                }
                params.push(self.advance().lexeme.clone());
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        if !self.matches(TokenKind::RParen) || !self.matches(TokenKind::Assign) {
            return Ok(None);
        }
        let body = self.parse_expression()?;
        self.expect_end()?;
        let text = self
            .source
            .get(body.span.start..body.span.end)
            .unwrap_or_default()
            .to_string();
        Ok(Some(StmtKind::Function {
            target: Target {
                name: name.lexeme,
                span: name.span,
            },
            params,
            body,
            text,
        }))
    }

    fn parse_value_list(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut values = vec![self.parse_expression()?];
        while self.matches(TokenKind::Comma) {
            values.push(self.parse_expression()?);
        }
        self.expect_end()?;
        Ok(values)
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_fallback()
    }

    fn parse_fallback(&mut self) -> Result<Expr, Diagnostic> {
        if !self.check(TokenKind::Keyword(Keyword::Fa)) {
            return self.parse_ternary();
        }
        let start = self.current;
        self.advance();
        let attempt = self.parse_expression()?;
        self.consume(TokenKind::Keyword(Keyword::Fo), "`fo`")?;
        let fallback = self.parse_expression()?;
        Ok(self.node(
            start,
            ExprKind::Fallback {
                attempt: Box::new(attempt),
                fallback: Box::new(fallback),
            },
        ))
    }

    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let condition = self.parse_or()?;
        if !self.check(TokenKind::Question) {
            return Ok(condition);
        }
        let question = self.current;
        self.advance();
        if self.check(TokenKind::Colon) || self.at_expression_end() {
            return Err(
                token_error(ErrorCode::EmptyTernaryBranch, question, &self.tokens[question])
                    .with_str("true"),
            );
        }
        let then_branch = self.parse_ternary()?;
        if !self.matches(TokenKind::Colon) {
            return Err(token_error(
                ErrorCode::UnmatchedTernary,
                question,
                &self.tokens[question],
            ));
        }
        if self.at_expression_end() {
            return Err(
                token_error(ErrorCode::EmptyTernaryBranch, question, &self.tokens[question])
                    .with_str("false"),
            );
        }
        let else_branch = self.parse_ternary()?;
        Ok(self.node(
            start,
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::OrOr) || self.matches(TokenKind::Keyword(Keyword::Or)) {
            let right = self.parse_and()?;
            expr = self.binary(start, BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_comparison()?;
        while self.matches(TokenKind::AndAnd) || self.matches(TokenKind::Keyword(Keyword::And)) {
            let right = self.parse_comparison()?;
            expr = self.binary(start, BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let first = self.parse_membership()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_membership()?));
        }
        Ok(match rest.len() {
            0 => first,
            1 => {
                let (op, right) = rest.remove(0);
                self.binary(start, op, first, right)
            }
            _ => self.node(
                start,
                ExprKind::Comparison {
                    first: Box::new(first),
                    rest,
                },
            ),
        })
    }

    fn parse_membership(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_additive()?;
        loop {
            match self.peek_kind() {
                TokenKind::Keyword(Keyword::In) => {
                    self.advance();
                    let right = self.parse_additive()?;
                    expr = self.binary(start, BinaryOp::In, expr, right);
                }
                TokenKind::Keyword(Keyword::Keyof) => {
                    self.advance();
                    let right = self.parse_additive()?;
                    expr = self.binary(start, BinaryOp::Keyof, expr, right);
                }
                TokenKind::Keyword(keyword @ (Keyword::Is | Keyword::Can)) => {
                    self.advance();
                    let ty = self.parse_type_expr()?;
                    let test = if keyword == Keyword::Is {
                        TypeTest::Is
                    } else {
                        TypeTest::Can
                    };
                    expr = self.node(
                        start,
                        ExprKind::TypeTest {
                            expr: Box::new(expr),
                            test,
                            ty,
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = self.binary(start, op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                // Juxtaposition (`2x`, `3(a + b)`) multiplies.
                TokenKind::Name | TokenKind::LParen => {
                    let right = self.parse_unary()?;
                    expr = self.binary(start, BinaryOp::Mul, expr, right);
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = self.binary(start, op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang | TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(self.node(
            start,
            ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
        ))
    }

    fn parse_power(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let base = self.parse_cast()?;
        if self.matches(TokenKind::Caret) {
            let exponent = self.parse_unary()?;
            return Ok(self.binary(start, BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_cast(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_postfix()?;
        while self.matches(TokenKind::Keyword(Keyword::As)) {
            let target = if self.check(TokenKind::Unit) {
                CastTarget::Unit(self.advance().lexeme.clone())
            } else {
                CastTarget::Kind(self.parse_type_expr()?)
            };
            expr = self.node(
                start,
                ExprKind::Cast {
                    expr: Box::new(expr),
                    target,
                },
            );
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Unit => {
                    let unit = self.advance().lexeme.clone();
                    expr = self.node(
                        start,
                        ExprKind::Measurement {
                            value: Box::new(expr),
                            unit,
                        },
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_index()?;
                    self.consume(TokenKind::RBracket, "`]`")?;
                    expr = self.node(
                        start,
                        ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                    );
                }
                TokenKind::LBrace => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RBrace, "`}`")?;
                    expr = self.node(
                        start,
                        ExprKind::Column {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                    );
                }
                TokenKind::Pipe => {
                    let pipe = self.current;
                    self.advance();
                    let callable = matches!(self.peek_kind(), TokenKind::Name)
                        && self.peek_kind_at(1) == TokenKind::LParen;
                    if !callable {
                        return Err(token_error(ErrorCode::PipeTarget, pipe, &self.tokens[pipe]));
                    }
                    let call = self.parse_primary()?;
                    expr = self.node(
                        start,
                        ExprKind::Pipe {
                            value: Box::new(expr),
                            call: Box::new(call),
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_index(&mut self) -> Result<Index, Diagnostic> {
        let start = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        if !self.matches(TokenKind::Colon) {
            return match start {
                Some(expr) => Ok(Index::Expr(expr)),
                None => Err(self.unexpected("an index")),
            };
        }
        let end = if self.check(TokenKind::Colon) || self.check(TokenKind::RBracket) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let step = if self.matches(TokenKind::Colon) && !self.check(TokenKind::RBracket) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Index::Slice { start, end, step })
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.current;
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| self.unexpected_at(start))?;
                ExprKind::Literal(Literal::Number(value))
            }
            TokenKind::String => {
                self.advance();
                ExprKind::Literal(Literal::String(token.lexeme))
            }
            TokenKind::Date => {
                self.advance();
                let date = dates::parse_date(&token.lexeme).ok_or_else(|| {
                    token_error(ErrorCode::InvalidDate, start, &token).with_str(token.lexeme.clone())
                })?;
                ExprKind::Literal(Literal::Date(date))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                ExprKind::Literal(Literal::None)
            }
            TokenKind::Name => {
                self.advance();
                if self.matches(TokenKind::LParen) {
                    let args = self.parse_items(TokenKind::RParen)?;
                    ExprKind::Call {
                        callee: token.lexeme,
                        args,
                        is_macro: false,
                    }
                } else {
                    ExprKind::Name(token.lexeme)
                }
            }
            TokenKind::Macro => {
                if start != 0 {
                    return Err(token_error(ErrorCode::MacroPlacement, start, &token)
                        .with_str(token.lexeme));
                }
                self.advance();
                let args = if self.matches(TokenKind::LParen) {
                    self.parse_items(TokenKind::RParen)?
                } else {
                    Vec::new()
                };
                ExprKind::Call {
                    callee: token.lexeme,
                    args,
                    is_macro: true,
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen, "`)`")?;
                inner.kind
            }
            TokenKind::LBracket => {
                self.advance();
                self.parse_vector()?
            }
            TokenKind::Spread => {
                self.advance();
                let operand = self.parse_unary()?;
                ExprKind::Spread(Box::new(operand))
            }
            TokenKind::Eof => {
                return Err(Diagnostic::error(ErrorCode::UnexpectedEnd)
                    .with_span(token.span)
                    .with_str("an expression"))
            }
            _ => return Err(self.unexpected_at(start)),
        };
        Ok(self.node(start, kind))
    }

    /// Comma-separated items up to `close`, which is consumed. An item may
    /// be labelled `name: value` or `"name": value`.
    fn parse_items(&mut self, close: TokenKind) -> Result<Vec<Item>, Diagnostic> {
        let mut items = Vec::new();
        if self.matches(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_item()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(close, close.describe().as_str())?;
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Item, Diagnostic> {
        let labelled = matches!(self.peek_kind(), TokenKind::Name | TokenKind::String)
            && self.peek_kind_at(1) == TokenKind::Colon;
        let name = if labelled {
            let name = self.advance().lexeme.clone();
            self.advance();
            Some(name)
        } else {
            None
        };
        let value = self.parse_expression()?;
        Ok(Item { name, value })
    }

    /// Called after `[`: an enumerated literal or a constructed vector.
    fn parse_vector(&mut self) -> Result<ExprKind, Diagnostic> {
        if self.matches(TokenKind::RBracket) {
            return Ok(ExprKind::Vector(Vec::new()));
        }
        if self.check(TokenKind::Keyword(Keyword::For)) {
            return self.parse_constructor(None);
        }
        let first = self.parse_item()?;
        if first.name.is_none() && self.check(TokenKind::Keyword(Keyword::For)) {
            return self.parse_constructor(Some(first.value));
        }
        let mut items = vec![first];
        while self.matches(TokenKind::Comma) {
            items.push(self.parse_item()?);
        }
        self.consume(TokenKind::RBracket, "`]`")?;
        Ok(ExprKind::Vector(items))
    }

    fn parse_constructor(&mut self, body: Option<Expr>) -> Result<ExprKind, Diagnostic> {
        let mut clauses = Vec::new();
        while self.matches(TokenKind::Keyword(Keyword::For)) {
            let binding = self.consume(TokenKind::Name, "a loop variable")?.lexeme;
            if self.matches(TokenKind::Assign) {
                let start = self.parse_expression()?;
                let inclusive = if self.matches(TokenKind::Keyword(Keyword::To)) {
                    true
                } else if self.matches(TokenKind::Keyword(Keyword::Until)) {
                    false
                } else {
                    return Err(self.unexpected("`to` or `until`"));
                };
                let end = self.parse_expression()?;
                let step = if self.matches(TokenKind::Keyword(Keyword::Step)) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                clauses.push(Clause::Range {
                    binding,
                    start,
                    end,
                    inclusive,
                    step,
                });
            } else if self.matches(TokenKind::Keyword(Keyword::In)) {
                let source = self.parse_expression()?;
                clauses.push(Clause::Each { binding, source });
            } else {
                return Err(self.unexpected("`=` or `in`"));
            }
        }
        let mut modifiers = Vec::new();
        loop {
            let kind = match self.peek_kind() {
                TokenKind::Keyword(Keyword::Prepend) => ModifierKind::Prepend,
                TokenKind::Keyword(Keyword::Append) => ModifierKind::Append,
                TokenKind::Keyword(Keyword::Include) => ModifierKind::Include,
                TokenKind::Keyword(Keyword::Exclude) => ModifierKind::Exclude,
                _ => break,
            };
            self.advance();
            let value = self.parse_expression()?;
            modifiers.push(Modifier { kind, value });
        }
        self.consume(TokenKind::RBracket, "`]`")?;
        Ok(ExprKind::Construct(Box::new(Constructor {
            body,
            clauses,
            modifiers,
        })))
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, Diagnostic> {
        let name = self.consume(TokenKind::Name, "a type name")?;
        let mut span = name.span;
        let element = if self.matches(TokenKind::Less) {
            let inner = self.consume(TokenKind::Name, "an element type")?;
            let close = self.consume(TokenKind::Greater, "`>`")?;
            span = span.join(close.span);
            Some(inner.lexeme)
        } else {
            None
        };
        Ok(TypeExpr {
            name: name.lexeme,
            element,
            span,
        })
    }

    fn binary(&self, start: usize, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.node(
            start,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    fn node(&self, start: usize, kind: ExprKind) -> Expr {
        let end = self.current.max(start + 1).min(self.tokens.len());
        let first = self.tokens[start.min(self.tokens.len() - 1)].span;
        let last = self.tokens[end - 1].span;
        Expr {
            kind,
            span: first.join(last),
            tokens: start..end,
        }
    }

    fn line_span(&self) -> SourceSpan {
        SourceSpan::new(0, self.source.len())
    }

    fn consume_target(&mut self, expected: &str) -> Result<Target, Diagnostic> {
        let token = self.consume(TokenKind::Name, expected)?;
        Ok(Target {
            name: token.lexeme,
            span: token.span,
        })
    }

    fn expect_end(&self) -> Result<(), Diagnostic> {
        if self.is_at_end() {
            return Ok(());
        }
        if self.check(TokenKind::Comma) {
            let rest = self
                .source
                .get(self.tokens[0].span.start..)
                .unwrap_or_default()
                .trim()
                .to_string();
            return Err(token_error(
                ErrorCode::UnresolvedExpression,
                self.current,
                &self.tokens[self.current],
            )
            .with_str(rest));
        }
        Err(self.unexpected_at(self.current))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Comma
                | TokenKind::Colon
        )
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            Diagnostic::error(ErrorCode::UnexpectedEnd)
                .with_span(token.span)
                .with_str(expected)
        } else {
            self.unexpected_at(self.current)
        }
    }

    fn unexpected_at(&self, index: usize) -> Diagnostic {
        let token = &self.tokens[index.min(self.tokens.len() - 1)];
        let what = match token.kind {
            TokenKind::Number | TokenKind::Name | TokenKind::Unknown => {
                format!("{} `{}`", token.kind.describe(), token.lexeme)
            }
            kind => kind.describe(),
        };
        token_error(ErrorCode::UnexpectedToken, index, token).with_str(what)
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current + offset)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Stmt {
        parse_source(source).expect("parses").1
    }

    fn parse_err(source: &str) -> Diagnostic {
        parse_source(source).expect_err("should fail")
    }

    fn expr(source: &str) -> Expr {
        match parse(source).kind {
            StmtKind::Expr(expr) => expr,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn unary_minus_is_looser_than_power() {
        let e = expr("-2^2");
        match e.kind {
            ExprKind::Unary {
                op: UnaryOp::Negate,
                expr,
            } => assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Pow, .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn juxtaposition_multiplies() {
        let e = expr("2x");
        assert!(matches!(e.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn chained_comparison_is_kept_together() {
        let e = expr("1 < x <= 3");
        match e.kind {
            ExprKind::Comparison { rest, .. } => assert_eq!(rest.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn declaration_forms() {
        assert!(matches!(parse("x = 1").kind, StmtKind::Declare { .. }));
        assert!(matches!(
            parse("x is Number = 1").kind,
            StmtKind::Declare {
                annotation: Some(_),
                ..
            }
        ));
        assert!(matches!(parse("x, y is Variable").kind, StmtKind::Variables(ref t) if t.len() == 2));
        assert!(matches!(parse("f(a, b) = a + b").kind, StmtKind::Function { .. }));
        assert!(matches!(parse("v << 4").kind, StmtKind::Append { .. }));
        assert!(matches!(parse("import stats").kind, StmtKind::Import { .. }));
        assert!(matches!(parse("x is Number").kind, StmtKind::Expr(_)));
        assert!(matches!(parse("f(2) + 1").kind, StmtKind::Expr(_)));
    }

    #[test]
    fn function_text_is_the_body_source() {
        match parse("sq(x) = x * x").kind {
            StmtKind::Function { text, params, .. } => {
                assert_eq!(text, "x * x");
                assert_eq!(params, vec!["x"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn constructed_vectors() {
        let e = expr("[x^2 for x = 1 to 5 step 2 exclude 9]");
        match e.kind {
            ExprKind::Construct(c) => {
                assert!(c.body.is_some());
                assert_eq!(c.clauses.len(), 1);
                assert_eq!(c.modifiers.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slices_and_named_items() {
        let e = expr("v[2::2]");
        match e.kind {
            ExprKind::Index { index, .. } => match *index {
                Index::Slice { start, end, step } => {
                    assert!(start.is_some() && end.is_none() && step.is_some())
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        match expr("[a: 1, \"b\": 2]").kind {
            ExprKind::Vector(items) => {
                assert_eq!(items[0].name.as_deref(), Some("a"));
                assert_eq!(items[1].name.as_deref(), Some("b"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn structural_errors() {
        assert!(parse_err("fa 1").is_error(ErrorCode::UnbalancedFallback));
        assert!(parse_err("fo 1").is_error(ErrorCode::UnbalancedFallback));
        assert!(parse_err("(1 + 2").is_error(ErrorCode::UnbalancedGrouping));
        assert!(parse_err("[1, 2)").is_error(ErrorCode::UnbalancedGrouping));
        assert!(parse_err("true ? 1").is_error(ErrorCode::UnmatchedTernary));
        assert!(parse_err("true ? : 1").is_error(ErrorCode::EmptyTernaryBranch));
        assert!(parse_err("true ? 1 :").is_error(ErrorCode::EmptyTernaryBranch));
        assert!(parse_err("x |> 3").is_error(ErrorCode::PipeTarget));
        assert!(parse_err("1 + print!(2)").is_error(ErrorCode::MacroPlacement));
        assert!(parse_err("1, 2").is_error(ErrorCode::UnresolvedExpression));
    }

    #[test]
    fn provenance_ranges_cover_tokens() {
        let e = expr("1 + 2");
        assert_eq!(e.tokens, 0..3);
        match e.kind {
            ExprKind::Binary { right, .. } => assert_eq!(right.tokens, 2..3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
