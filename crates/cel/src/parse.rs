//! The expression parser.
//!
//! Precedence-climbing over the token stream, lowest to highest: ternary
//! `?:` (right-associative), `||`, `&&`, equality, relational (including
//! `in`), additive, multiplicative, unary, postfix chains, primary. All
//! binary operators are left-associative.
//!
//! Structural limits are enforced during construction, not after: the total
//! node budget, the nesting depth across aggregate literals, member/index
//! chains and call nesting, and the per-literal element counts. Each
//! violation is a parse failure carrying the limit's name.

use std::sync::Arc;

use crate::{
    ast::{BinaryOp, CodeRange, Expr, ExprLoc, Literal, UnaryOp},
    env::ParseLimits,
    error::ParseError,
    token::{Token, TokenKind, tokenize},
};

/// Parses a single expression, enforcing `limits`. `optional_syntax` gates
/// the `?.` and `[?` forms.
pub(crate) fn parse_expression(
    source: &str,
    limits: &ParseLimits,
    optional_syntax: bool,
) -> Result<ExprLoc, ParseError> {
    let tokens = tokenize(source).map_err(|e| e.with_source(source))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end_offset: source.len(),
        limits,
        optional_syntax,
        node_count: 0,
        depth: 0,
    };
    let expr = parser.parse_expr().map_err(|e| e.with_source(source))?;
    if let Some(token) = parser.peek() {
        let message = format!("unexpected trailing {}", token.kind.describe());
        let offset = token.range.start as usize;
        return Err(ParseError::new(message, offset).with_source(source));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    end_offset: usize,
    limits: &'a ParseLimits,
    optional_syntax: bool,
    node_count: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.range.start as usize)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance().expect("checked"))
        } else {
            Err(self.unexpected(&format!("expected {}", kind.describe())))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_owned(), |t| t.kind.describe());
        ParseError::new(format!("{expected}, found {found}"), self.offset())
    }

    /// Allocates a node against the AST budget.
    fn mk(&mut self, expr: Expr, range: CodeRange) -> Result<ExprLoc, ParseError> {
        self.node_count += 1;
        if self.node_count > self.limits.max_ast_nodes {
            return Err(ParseError::limit(
                "max_ast_nodes",
                self.limits.max_ast_nodes,
                range.start as usize,
            ));
        }
        Ok(ExprLoc::new(expr, range))
    }

    /// Enters one level of structural nesting (aggregate literal, call,
    /// index, member chain step, parenthesized group).
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(ParseError::limit("max_depth", self.limits.max_depth, self.offset()));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Ternary, right-associative: `cond ? then : otherwise`.
    fn parse_expr(&mut self) -> Result<ExprLoc, ParseError> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_expr()?;
        let range = cond.range.to(otherwise.range);
        self.mk(
            Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            range,
        )
    }

    /// Left-associative binary operators via precedence climbing.
    fn parse_binary(&mut self, min_prec: u8) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(prec + 1)?;
            let range = left.range.to(right.range);
            left = self.mk(
                Expr::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                range,
            )?;
        }
        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek_kind()? {
            TokenKind::OrOr => BinaryOp::Or,
            TokenKind::AndAnd => BinaryOp::And,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::In => BinaryOp::In,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> Result<ExprLoc, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => UnaryOp::Not,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let op_token = self.advance().expect("checked");
        let start = op_token.range;

        // `-` directly on an integer literal folds into the literal, which
        // is what allows `-9223372036854775808` to exist at all: the bare
        // magnitude exceeds i64::MAX.
        if op == UnaryOp::Neg
            && let Some(TokenKind::Int(magnitude)) = self.peek_kind().cloned()
        {
            let token = self.advance().expect("checked");
            let range = start.to(token.range);
            let value = i64::try_from(-i128::from(magnitude))
                .map_err(|_| ParseError::new("integer literal out of range", range.start as usize))?;
            return self.mk(Expr::Literal(Literal::Int(value)), range);
        }

        let operand = self.parse_unary()?;
        let range = start.to(operand.range);
        self.mk(
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            range,
        )
    }

    /// Postfix chain: `.f`, `?.f`, `[i]`, `[?i]`, `.m(args)`. Each applied
    /// step counts one level of structural nesting.
    fn parse_postfix(&mut self) -> Result<ExprLoc, ParseError> {
        let mut node = self.parse_primary()?;
        let mut chain_len = 0usize;
        let result = loop {
            match self.peek_kind() {
                Some(TokenKind::Dot | TokenKind::DotQuestion) => {
                    let optional = matches!(self.peek_kind(), Some(TokenKind::DotQuestion));
                    if optional && !self.optional_syntax {
                        break Err(ParseError::new(
                            "optional syntax '?.' requires the enable_optional_types option",
                            self.offset(),
                        ));
                    }
                    self.pos += 1;
                    if let Err(e) = self.descend() {
                        break Err(e);
                    }
                    chain_len += 1;
                    let (field, field_range) = match self.take_member_name() {
                        Ok(pair) => pair,
                        Err(e) => break Err(e),
                    };
                    if !optional && self.check(&TokenKind::LParen) {
                        let args = match self.parse_call_args() {
                            Ok(args) => args,
                            Err(e) => break Err(e),
                        };
                        let range = node.range.to(CodeRange::new(field_range.end, self.prev_end()));
                        node = match self.mk(
                            Expr::MethodCall {
                                receiver: Box::new(node),
                                method: field,
                                args,
                            },
                            range,
                        ) {
                            Ok(n) => n,
                            Err(e) => break Err(e),
                        };
                    } else {
                        let range = node.range.to(field_range);
                        node = match self.mk(
                            Expr::Member {
                                object: Box::new(node),
                                field,
                                optional,
                            },
                            range,
                        ) {
                            Ok(n) => n,
                            Err(e) => break Err(e),
                        };
                    }
                }
                Some(TokenKind::LBracket | TokenKind::LBracketQuestion) => {
                    let optional = matches!(self.peek_kind(), Some(TokenKind::LBracketQuestion));
                    if optional && !self.optional_syntax {
                        break Err(ParseError::new(
                            "optional syntax '[?' requires the enable_optional_types option",
                            self.offset(),
                        ));
                    }
                    self.pos += 1;
                    if let Err(e) = self.descend() {
                        break Err(e);
                    }
                    chain_len += 1;
                    let index = match self.parse_expr() {
                        Ok(index) => index,
                        Err(e) => break Err(e),
                    };
                    if let Err(e) = self.expect(&TokenKind::RBracket) {
                        break Err(e);
                    }
                    let range = node.range.to(CodeRange::new(index.range.end, self.prev_end()));
                    node = match self.mk(
                        Expr::Index {
                            object: Box::new(node),
                            index: Box::new(index),
                            optional,
                        },
                        range,
                    ) {
                        Ok(n) => n,
                        Err(e) => break Err(e),
                    };
                }
                _ => break Ok(node),
            }
        };
        for _ in 0..chain_len {
            self.ascend();
        }
        result
    }

    /// A member name after `.` or `?.`. Reserved words are permitted here;
    /// only bare identifier references are restricted.
    fn take_member_name(&mut self) -> Result<(Arc<str>, CodeRange), ParseError> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                let token = self.advance().expect("checked");
                Ok((name, token.range))
            }
            Some(TokenKind::In) => {
                let token = self.advance().expect("checked");
                Ok((Arc::from("in"), token.range))
            }
            _ => Err(self.unexpected("expected a member name after '.'")),
        }
    }

    fn prev_end(&self) -> u32 {
        self.tokens[self.pos - 1].range.end
    }

    fn parse_call_args(&mut self) -> Result<Vec<ExprLoc>, ParseError> {
        let open = self.expect(&TokenKind::LParen)?;
        self.descend()?;
        let mut args = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RParen) {
                break Ok(());
            }
            match self.parse_expr() {
                Ok(arg) => args.push(arg),
                Err(e) => break Err(e),
            }
            if args.len() > self.limits.max_call_arguments {
                break Err(ParseError::limit(
                    "max_call_arguments",
                    self.limits.max_call_arguments,
                    open.range.start as usize,
                ));
            }
            if !self.eat(&TokenKind::Comma) {
                break Ok(());
            }
        };
        self.ascend();
        result?;
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<ExprLoc, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("unexpected end of input", self.end_offset));
        };
        let range = token.range;
        match token.kind {
            TokenKind::Int(magnitude) => {
                let value = i64::try_from(magnitude)
                    .map_err(|_| ParseError::new("integer literal out of range", range.start as usize))?;
                self.mk(Expr::Literal(Literal::Int(value)), range)
            }
            TokenKind::Uint(value) => self.mk(Expr::Literal(Literal::Uint(value)), range),
            TokenKind::Double(value) => self.mk(Expr::Literal(Literal::Double(value)), range),
            TokenKind::Str(value) => self.mk(Expr::Literal(Literal::String(value)), range),
            TokenKind::Bytes(value) => self.mk(Expr::Literal(Literal::Bytes(value)), range),
            TokenKind::True => self.mk(Expr::Literal(Literal::Bool(true)), range),
            TokenKind::False => self.mk(Expr::Literal(Literal::Bool(false)), range),
            TokenKind::Null => self.mk(Expr::Literal(Literal::Null), range),
            TokenKind::Ident(name) => {
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let full = CodeRange::new(range.start, self.prev_end());
                    self.mk(Expr::Call { function: name, args }, full)
                } else {
                    self.mk(Expr::Ident(name), range)
                }
            }
            TokenKind::LParen => {
                self.descend()?;
                let inner = self.parse_expr();
                self.ascend();
                let inner = inner?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list_literal(range),
            TokenKind::LBrace => self.parse_map_literal(range),
            other => {
                let message = format!("unexpected {}", other.describe());
                Err(ParseError::new(message, range.start as usize))
            }
        }
    }

    /// `[a, b, c]` with an optional trailing comma.
    fn parse_list_literal(&mut self, open: CodeRange) -> Result<ExprLoc, ParseError> {
        self.descend()?;
        let mut items = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RBracket) {
                break Ok(());
            }
            match self.parse_expr() {
                Ok(item) => items.push(item),
                Err(e) => break Err(e),
            }
            if items.len() > self.limits.max_list_elements {
                break Err(ParseError::limit(
                    "max_list_elements",
                    self.limits.max_list_elements,
                    open.start as usize,
                ));
            }
            if !self.eat(&TokenKind::Comma) {
                break Ok(());
            }
        };
        self.ascend();
        result?;
        self.expect(&TokenKind::RBracket)?;
        let range = CodeRange::new(open.start, self.prev_end());
        self.mk(Expr::ListLit(items), range)
    }

    /// `{k: v, ...}` with an optional trailing comma. Duplicate keys are
    /// permitted; the last write wins at evaluation.
    fn parse_map_literal(&mut self, open: CodeRange) -> Result<ExprLoc, ParseError> {
        self.descend()?;
        let mut entries = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RBrace) {
                break Ok(());
            }
            let key = match self.parse_expr() {
                Ok(key) => key,
                Err(e) => break Err(e),
            };
            if let Err(e) = self.expect(&TokenKind::Colon) {
                break Err(e);
            }
            match self.parse_expr() {
                Ok(value) => entries.push((key, value)),
                Err(e) => break Err(e),
            }
            if entries.len() > self.limits.max_map_entries {
                break Err(ParseError::limit(
                    "max_map_entries",
                    self.limits.max_map_entries,
                    open.start as usize,
                ));
            }
            if !self.eat(&TokenKind::Comma) {
                break Ok(());
            }
        };
        self.ascend();
        result?;
        self.expect(&TokenKind::RBrace)?;
        let range = CodeRange::new(open.start, self.prev_end());
        self.mk(Expr::MapLit(entries), range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ExprLoc {
        parse_expression(source, &ParseLimits::default(), true).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse_expression(source, &ParseLimits::default(), true).unwrap_err()
    }

    #[test]
    fn precedence_follows_the_ladder() {
        let ast = parse("1 + 2 * 3");
        let Expr::Binary { op, right, .. } = &ast.expr else {
            panic!("expected binary node, got {ast:?}");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(right.expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let ast = parse("1 - 2 - 3");
        let Expr::Binary { left, op, .. } = &ast.expr else {
            panic!("expected binary node");
        };
        assert_eq!(*op, BinaryOp::Sub);
        assert!(matches!(left.expr, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn ternary_is_right_associative() {
        let ast = parse("a ? b : c ? d : e");
        let Expr::Ternary { otherwise, .. } = &ast.expr else {
            panic!("expected ternary node");
        };
        assert!(matches!(otherwise.expr, Expr::Ternary { .. }));
    }

    #[test]
    fn min_int_literal_folds() {
        let ast = parse("-9223372036854775808");
        assert_eq!(ast.expr, Expr::Literal(Literal::Int(i64::MIN)));
        assert!(
            parse_err("9223372036854775808")
                .message()
                .contains("integer literal out of range")
        );
    }

    #[test]
    fn trailing_commas_in_aggregates() {
        assert!(matches!(parse("[1, 2,]").expr, Expr::ListLit(items) if items.len() == 2));
        assert!(matches!(parse("{1: 2,}").expr, Expr::MapLit(entries) if entries.len() == 1));
    }

    #[test]
    fn optional_syntax_is_gated() {
        let err = parse_expression("a.?b", &ParseLimits::default(), false).unwrap_err();
        assert!(err.message().contains("enable_optional_types"));
        let err = parse_expression("a[?0]", &ParseLimits::default(), false).unwrap_err();
        assert!(err.message().contains("enable_optional_types"));
    }

    #[test]
    fn node_budget_is_enforced() {
        let limits = ParseLimits {
            max_ast_nodes: 3,
            ..ParseLimits::default()
        };
        let err = parse_expression("1 + 2 + 3", &limits, false).unwrap_err();
        assert!(err.message().contains("max_ast_nodes"), "got: {err}");
    }

    #[test]
    fn depth_limit_counts_aggregate_nesting() {
        let limits = ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        };
        assert!(parse_expression("[[[1]]]", &limits, false).is_ok());
        let err = parse_expression("[[[[1]]]]", &limits, false).unwrap_err();
        assert!(err.message().contains("max_depth"), "got: {err}");
    }

    #[test]
    fn depth_limit_counts_member_chains() {
        let limits = ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        };
        assert!(parse_expression("a.b.c.d", &limits, false).is_ok());
        let err = parse_expression("a.b.c.d.e", &limits, false).unwrap_err();
        assert!(err.message().contains("max_depth"), "got: {err}");
    }

    #[test]
    fn call_argument_limit() {
        let limits = ParseLimits {
            max_call_arguments: 2,
            ..ParseLimits::default()
        };
        assert!(parse_expression("f(1, 2)", &limits, false).is_ok());
        let err = parse_expression("f(1, 2, 3)", &limits, false).unwrap_err();
        assert!(err.message().contains("max_call_arguments"), "got: {err}");
    }

    #[test]
    fn caret_rendering_points_at_the_failure() {
        let err = parse_err("1 + }");
        let rendered = err.to_string();
        assert!(rendered.contains("1 + }"), "got: {rendered}");
        assert!(rendered.lines().last().unwrap_or_default().trim_end().ends_with('^'));
    }

    #[test]
    fn reserved_words_parse_as_member_names_and_map_keys() {
        assert!(matches!(parse("a.if").expr, Expr::Member { .. }));
        assert!(matches!(parse("{\"while\": 1}").expr, Expr::MapLit(_)));
    }
}
