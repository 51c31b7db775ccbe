use crate::error::ParseError;
use crate::tpl::ast::{
    BlockStmt, ElseBranch, ExtendStmt, Expression, ForStmt, Identifier, IfStmt, IncludeStmt,
    RangeStmt, SetOp, SetStmt, Statement, Tree,
};
use crate::tpl::expr::parse_expr;
use crate::tpl::token::{Token, TokenKind};
use crate::tpl::token_stream::TokenStream;

/// A finished `if`/`elseif` arm: its condition and body.
type IfArm = (Expression, Vec<Statement>);

/// An open block tag waiting for its closer.
///
/// Each frame owns one level of `nodes_stack`: the body currently being
/// filled. `elseif` and `else` swap that body without adding a level.
enum TagFrame {
    If {
        arms: Vec<IfArm>,
        /// Condition of the arm being filled; `None` once inside `else`.
        cond: Option<Expression>,
    },
    For {
        init: Option<SetStmt>,
        cond: Option<Expression>,
        post: Option<SetStmt>,
    },
    Range {
        key: Option<Identifier>,
        value: Option<Identifier>,
        source: Expression,
    },
    Block {
        name: String,
    },
}

impl TagFrame {
    fn keyword(&self) -> &'static str {
        match self {
            TagFrame::If { .. } => "if",
            TagFrame::For { .. } => "for",
            TagFrame::Range { .. } => "range",
            TagFrame::Block { .. } => "block",
        }
    }

    fn closer(&self) -> &'static str {
        match self {
            TagFrame::If { .. } => "endif",
            TagFrame::For { .. } => "endfor",
            TagFrame::Range { .. } => "endrange",
            TagFrame::Block { .. } => "endblock",
        }
    }
}

/// Builds a [`Tree`] from a token stream.
pub fn parse(stream: TokenStream) -> Result<Tree, ParseError> {
    Parser::new(stream).parse()
}

/// Parses `target op [value]` as used by `set`, `for` and `include ... with`.
pub fn parse_assignment(tokens: &[Token], line: usize) -> Result<SetStmt, ParseError> {
    let invalid = |reason: String, line: usize| ParseError::InvalidAssignment { reason, line };

    let Some(target) = tokens.first() else {
        return Err(invalid("missing target".to_string(), line));
    };
    if target.kind != TokenKind::Name {
        return Err(invalid(
            format!("target must be a name, found {}", target.describe()),
            target.line,
        ));
    }
    let Some(op_token) = tokens.get(1) else {
        return Err(invalid(
            format!("missing operator after `{}`", target.value),
            target.line,
        ));
    };
    let op = (op_token.kind == TokenKind::Operator)
        .then(|| SetOp::from_symbol(&op_token.value))
        .flatten()
        .ok_or_else(|| {
            invalid(
                format!("unsupported operator {}", op_token.describe()),
                op_token.line,
            )
        })?;

    let rest = &tokens[2..];
    let value = if op.takes_value() {
        if rest.is_empty() {
            return Err(invalid(
                format!("missing value for `{}`", target.value),
                op_token.line,
            ));
        }
        Some(parse_expr(rest)?)
    } else {
        if let Some(extra) = rest.first() {
            return Err(invalid(
                format!("`{}` takes no value, found {}", op.symbol(), extra.describe()),
                extra.line,
            ));
        }
        None
    };

    Ok(SetStmt {
        target: Identifier::new(&target.value),
        op,
        value,
    })
}

/// Single-pass statement parser over a [`TokenStream`].
///
/// Nesting is tracked with two stacks that always move together:
/// `nodes_stack` holds the bodies being filled (root first) and `tag_stack`
/// the open tags that own them, so `nodes_stack.len() == tag_stack.len() + 1`.
struct Parser {
    stream: TokenStream,
    nodes_stack: Vec<Vec<Statement>>,
    tag_stack: Vec<TagFrame>,
    extend: Option<ExtendStmt>,
}

impl Parser {
    fn new(stream: TokenStream) -> Self {
        Self {
            stream,
            nodes_stack: vec![Vec::new()], // Root level.
            tag_stack: Vec::new(),
            extend: None,
        }
    }

    fn parse(mut self) -> Result<Tree, ParseError> {
        while !self.stream.is_eof() {
            let token = self.stream.next()?.clone();
            match token.kind {
                TokenKind::Text => self.append_text(&token.value),
                TokenKind::ValueStart => self.parse_value()?,
                TokenKind::BlockStart => self.parse_tag()?,
                _ => return Err(unexpected(&token)),
            }
        }

        if let Some(frame) = self.tag_stack.last() {
            return Err(ParseError::UnexpectedEndOfFile {
                line: self.stream.current().line,
                unclosed: Some(frame.keyword()),
            });
        }

        Ok(Tree {
            statements: self.nodes_stack.pop().unwrap_or_default(),
            extend: self.extend,
        })
    }

    fn parse_value(&mut self) -> Result<(), ParseError> {
        let tokens = self.stream.take_until(TokenKind::ValueEnd)?.to_vec();
        let expr = self.expression(&tokens)?;
        self.append_node(Statement::Value { expr });
        Ok(())
    }

    fn parse_tag(&mut self) -> Result<(), ParseError> {
        let keyword = self.stream.next()?.clone();
        if keyword.kind != TokenKind::Name {
            return Err(unexpected(&keyword));
        }
        let args = self.stream.take_until(TokenKind::BlockEnd)?.to_vec();

        match keyword.value.as_str() {
            "if" => {
                let cond = self.expression(&args)?;
                self.open(TagFrame::If {
                    arms: Vec::new(),
                    cond: Some(cond),
                });
            }
            "elseif" => {
                let cond = self.expression(&args)?;
                self.next_arm(&keyword, Some(cond))?;
            }
            "else" => {
                expect_no_args(&args)?;
                self.next_arm(&keyword, None)?;
            }
            "for" => self.parse_for(&args)?,
            "range" => self.parse_range(&args)?,
            "block" => self.parse_block(&args)?,
            "endif" | "endfor" | "endrange" | "endblock" => {
                expect_no_args(&args)?;
                self.close(&keyword)?;
            }
            "set" => {
                let set = parse_assignment(&args, keyword.line)?;
                self.append_node(Statement::Set(set));
            }
            "include" => self.parse_include(&args)?,
            "extend" => self.parse_extend(&keyword, &args)?,
            _ => return Err(unexpected(&keyword)),
        }
        Ok(())
    }

    /// `for cond` or `for init; cond; post`, any part may be empty.
    fn parse_for(&mut self, args: &[Token]) -> Result<(), ParseError> {
        let groups: Vec<&[Token]> = args.split(|t| t.is_punct(";")).collect();
        let end_line = self.stream.previous().line;
        let assignment = |group: &[Token]| match group.first() {
            Some(first) => parse_assignment(group, first.line).map(Some),
            None => Ok(None),
        };

        let frame = match groups.as_slice() {
            [cond] => TagFrame::For {
                init: None,
                cond: self.optional_expression(cond)?,
                post: None,
            },
            [init, cond, post] => TagFrame::For {
                init: assignment(*init)?,
                cond: self.optional_expression(cond)?,
                post: assignment(*post)?,
            },
            _ => {
                let found = args
                    .iter()
                    .rev()
                    .find(|t| t.is_punct(";"))
                    .map(unexpected)
                    .unwrap_or(ParseError::UnexpectedToken {
                        found: "`for` clauses".to_string(),
                        line: end_line,
                    });
                return Err(found);
            }
        };
        self.open(frame);
        Ok(())
    }

    /// `range key[, value] = source`, `_` leaves a binding out.
    fn parse_range(&mut self, args: &[Token]) -> Result<(), ParseError> {
        let Some(eq) = args.iter().position(|t| t.is_operator("=")) else {
            return Err(match args.first() {
                Some(first) if first.kind != TokenKind::Name => unexpected(first),
                _ => self.unexpected_closer(),
            });
        };

        let (key, value) = match &args[..eq] {
            [key] if key.kind == TokenKind::Name => (binding(key), None),
            [key, comma, value]
                if key.kind == TokenKind::Name
                    && comma.is_punct(",")
                    && value.kind == TokenKind::Name =>
            {
                (binding(key), binding(value))
            }
            [] => return Err(unexpected(&args[eq])),
            other => {
                let bad = other
                    .iter()
                    .enumerate()
                    .find(|(i, t)| match i {
                        1 => !t.is_punct(","),
                        _ => t.kind != TokenKind::Name,
                    })
                    .map(|(_, t)| t)
                    .unwrap_or(&args[eq]);
                return Err(unexpected(bad));
            }
        };

        let source = self.expression(&args[eq + 1..])?;
        self.open(TagFrame::Range { key, value, source });
        Ok(())
    }

    fn parse_block(&mut self, args: &[Token]) -> Result<(), ParseError> {
        match args {
            [name] if name.kind == TokenKind::Name => {
                self.open(TagFrame::Block {
                    name: name.value.clone(),
                });
                Ok(())
            }
            [] => Err(self.unexpected_closer()),
            [name] => Err(unexpected(name)),
            [_, extra, ..] => Err(unexpected(extra)),
        }
    }

    /// `include "name" [with set; set; ...]`
    fn parse_include(&mut self, args: &[Token]) -> Result<(), ParseError> {
        let template = match args.first() {
            Some(t) if t.kind == TokenKind::String => t.unquote(),
            Some(t) => return Err(unexpected(t)),
            None => return Err(self.unexpected_closer()),
        };

        let mut params = Vec::new();
        if let Some(with) = args.get(1) {
            if !with.is_name("with") {
                return Err(unexpected(with));
            }
            for clause in args[2..].split(|t| t.is_punct(";")) {
                if let Some(first) = clause.first() {
                    params.push(parse_assignment(clause, first.line)?);
                }
            }
            if params.is_empty() {
                return Err(unexpected(with));
            }
        }

        self.append_node(Statement::Include(IncludeStmt { template, params }));
        Ok(())
    }

    /// `extend` is accepted once, at top level, before any content other
    /// than whitespace.
    fn parse_extend(&mut self, keyword: &Token, args: &[Token]) -> Result<(), ParseError> {
        let content_before = self.nodes_stack.first().is_some_and(|root| {
            root.iter().any(|stmt| match stmt {
                Statement::Text { literal } => !literal.trim().is_empty(),
                _ => true,
            })
        });
        if self.extend.is_some() || !self.tag_stack.is_empty() || content_before {
            return Err(unexpected(keyword));
        }

        let template = match args {
            [t] if t.kind == TokenKind::String => t.unquote(),
            [] => return Err(self.unexpected_closer()),
            [t] => return Err(unexpected(t)),
            [_, extra, ..] => return Err(unexpected(extra)),
        };
        self.extend = Some(ExtendStmt { template });
        Ok(())
    }

    fn open(&mut self, frame: TagFrame) {
        self.tag_stack.push(frame);
        self.nodes_stack.push(Vec::new());
    }

    /// Ends the current `if` arm and starts the next one. `cond` is `None`
    /// for `else`.
    fn next_arm(&mut self, keyword: &Token, cond: Option<Expression>) -> Result<(), ParseError> {
        let Some(TagFrame::If {
            arms,
            cond: current,
        }) = self.tag_stack.last_mut()
        else {
            return Err(unexpected(keyword));
        };
        // Nothing may follow `else`.
        let Some(open) = current.take() else {
            return Err(unexpected(keyword));
        };

        let body = self.nodes_stack.pop().unwrap_or_default();
        arms.push((open, body));
        *current = cond;
        self.nodes_stack.push(Vec::new());
        Ok(())
    }

    /// Closes the innermost open tag; `keyword` has to be its closer.
    fn close(&mut self, keyword: &Token) -> Result<(), ParseError> {
        match self.tag_stack.last() {
            Some(frame) if frame.closer() == keyword.value => {}
            _ => return Err(unexpected(keyword)),
        }
        let (Some(frame), Some(body)) = (self.tag_stack.pop(), self.nodes_stack.pop()) else {
            return Err(unexpected(keyword));
        };

        let stmt = match frame {
            TagFrame::If { mut arms, cond } => {
                let else_body = match cond {
                    Some(cond) => {
                        arms.push((cond, body));
                        None
                    }
                    None => Some(body),
                };
                Statement::If(close_if(arms, else_body).ok_or_else(|| unexpected(keyword))?)
            }
            TagFrame::For { init, cond, post } => Statement::For(ForStmt {
                init,
                cond,
                post,
                body,
            }),
            TagFrame::Range { key, value, source } => Statement::Range(RangeStmt {
                key,
                value,
                source,
                body,
            }),
            TagFrame::Block { name } => Statement::Block(BlockStmt { name, body }),
        };
        self.append_node(stmt);
        Ok(())
    }

    fn append_node(&mut self, node: Statement) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            nodes.push(node);
        }
    }

    /// Appends text, merging with a directly preceding text node.
    fn append_text(&mut self, text: &str) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            if let Some(Statement::Text { literal }) = nodes.last_mut() {
                literal.push_str(text);
            } else {
                nodes.push(Statement::Text {
                    literal: text.to_string(),
                });
            }
        }
    }

    /// Parses a tag's interior; an empty interior is reported on the closer.
    fn expression(&self, tokens: &[Token]) -> Result<Expression, ParseError> {
        if tokens.is_empty() {
            return Err(self.unexpected_closer());
        }
        Ok(parse_expr(tokens)?)
    }

    fn optional_expression(&self, tokens: &[Token]) -> Result<Option<Expression>, ParseError> {
        if tokens.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_expr(tokens)?))
    }

    /// The closer of the tag just consumed.
    fn unexpected_closer(&self) -> ParseError {
        unexpected(self.stream.previous())
    }
}

/// Folds finished arms (in source order) into a linked `if`/`elseif` chain.
fn close_if(mut arms: Vec<IfArm>, else_body: Option<Vec<Statement>>) -> Option<IfStmt> {
    let mut tail = else_body.map(|body| ElseBranch::Else { body });
    while let Some((cond, body)) = arms.pop() {
        let stmt = IfStmt {
            cond,
            body,
            else_branch: tail.map(Box::new),
        };
        if arms.is_empty() {
            return Some(stmt);
        }
        tail = Some(ElseBranch::If(stmt));
    }
    None
}

fn binding(token: &Token) -> Option<Identifier> {
    (token.value != "_").then(|| Identifier::new(&token.value))
}

fn expect_no_args(args: &[Token]) -> Result<(), ParseError> {
    match args.first() {
        Some(extra) => Err(unexpected(extra)),
        None => Ok(()),
    }
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        found: token.describe(),
        line: token.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use crate::tpl::ast::BinaryOp;
    use crate::tpl::lexer::tokenize;

    fn parse_str(text: &str) -> Result<Tree, ParseError> {
        parse(tokenize(&Source::new("test", text)).unwrap())
    }

    fn tree(text: &str) -> Tree {
        parse_str(text).unwrap()
    }

    fn text(literal: &str) -> Statement {
        Statement::Text {
            literal: literal.to_string(),
        }
    }

    fn id(name: &str) -> Expression {
        Expression::ident(name)
    }

    #[test]
    fn test_text_and_values() {
        let t = tree("Hello {{ user.name }}!");
        assert_eq!(
            t.statements,
            vec![
                text("Hello "),
                Statement::Value {
                    expr: id("user.name")
                },
                text("!")
            ]
        );
        assert!(t.extend.is_none());
    }

    #[test]
    fn test_nested_if() {
        let t = tree("{% if a %}{% if b %}x{% endif %}{% endif %}");
        assert_eq!(
            t.statements,
            vec![Statement::If(IfStmt {
                cond: id("a"),
                body: vec![Statement::If(IfStmt {
                    cond: id("b"),
                    body: vec![text("x")],
                    else_branch: None,
                })],
                else_branch: None,
            })]
        );
    }

    #[test]
    fn test_elseif_chain() {
        let t = tree("{% if a %}1{% elseif b %}2{% elseif c %}3{% else %}4{% endif %}");
        let Statement::If(first) = &t.statements[0] else {
            panic!("Expected If");
        };
        assert_eq!(first.cond, id("a"));
        assert_eq!(first.body, vec![text("1")]);

        let Some(ElseBranch::If(second)) = first.else_branch.as_deref() else {
            panic!("Expected elseif");
        };
        assert_eq!(second.cond, id("b"));
        assert_eq!(second.body, vec![text("2")]);

        let Some(ElseBranch::If(third)) = second.else_branch.as_deref() else {
            panic!("Expected elseif");
        };
        assert_eq!(third.cond, id("c"));

        match third.else_branch.as_deref() {
            Some(ElseBranch::Else { body }) => assert_eq!(body, &vec![text("4")]),
            _ => panic!("Expected else"),
        }
        assert_eq!(t.statements.len(), 1);
    }

    #[test]
    fn test_if_inside_else_keeps_depth() {
        let t = tree("{% if a %}{% else %}{% if b %}y{% endif %}z{% endif %}after");
        assert_eq!(t.statements.len(), 2);
        assert_eq!(t.statements[1], text("after"));
    }

    #[test]
    fn test_for_forms() {
        let t = tree("{% for i = 0; i < 3; i++ %}{{ i }}{% endfor %}");
        match &t.statements[0] {
            Statement::For(stmt) => {
                let init = stmt.init.as_ref().unwrap();
                assert_eq!(init.target.name, "i");
                assert_eq!(init.op, SetOp::Assign);
                assert_eq!(init.value, Some(Expression::number("0")));
                assert_eq!(
                    stmt.cond,
                    Some(Expression::binary(
                        BinaryOp::Lt,
                        id("i"),
                        Expression::number("3")
                    ))
                );
                let post = stmt.post.as_ref().unwrap();
                assert_eq!(post.op, SetOp::Increment);
                assert!(post.value.is_none());
                assert_eq!(stmt.body.len(), 1);
            }
            _ => panic!("Expected For"),
        }

        match &tree("{% for n > 0 %}{% endfor %}").statements[0] {
            Statement::For(stmt) => {
                assert!(stmt.init.is_none() && stmt.post.is_none());
                assert!(stmt.cond.is_some());
            }
            _ => panic!("Expected For"),
        }

        match &tree("{% for ; ; %}{% endfor %}").statements[0] {
            Statement::For(stmt) => {
                assert!(stmt.init.is_none() && stmt.cond.is_none() && stmt.post.is_none());
            }
            _ => panic!("Expected For"),
        }
    }

    #[test]
    fn test_for_with_two_groups_fails() {
        assert!(matches!(
            parse_str("{% for a; b %}{% endfor %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_range_bindings() {
        match &tree("{% range k, v = items %}{% endrange %}").statements[0] {
            Statement::Range(stmt) => {
                assert_eq!(stmt.key, Some(Identifier::new("k")));
                assert_eq!(stmt.value, Some(Identifier::new("v")));
                assert_eq!(stmt.source, id("items"));
            }
            _ => panic!("Expected Range"),
        }
        match &tree("{% range _, v = list(3) %}{% endrange %}").statements[0] {
            Statement::Range(stmt) => {
                assert_eq!(stmt.key, None);
                assert_eq!(stmt.value, Some(Identifier::new("v")));
                assert_eq!(
                    stmt.source,
                    Expression::call("list", vec![Expression::number("3")])
                );
            }
            _ => panic!("Expected Range"),
        }
        match &tree("{% range i = xs %}{% endrange %}").statements[0] {
            Statement::Range(stmt) => {
                assert_eq!(stmt.key, Some(Identifier::new("i")));
                assert_eq!(stmt.value, None);
            }
            _ => panic!("Expected Range"),
        }
    }

    #[test]
    fn test_range_errors() {
        assert!(matches!(
            parse_str("{% range k v = xs %}{% endrange %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("{% range k = %}{% endrange %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("{% range xs %}{% endrange %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_block() {
        let t = tree("{% block content %}body{% endblock %}");
        assert_eq!(
            t.statements,
            vec![Statement::Block(BlockStmt {
                name: "content".to_string(),
                body: vec![text("body")],
            })]
        );
        assert!(matches!(
            parse_str("{% block %}{% endblock %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("{% block a b %}{% endblock %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_set_forms() {
        let t = tree("{% set total += price * 2 %}{% set n-- %}");
        match &t.statements[0] {
            Statement::Set(set) => {
                assert_eq!(set.op, SetOp::AddAssign);
                assert!(set.value.is_some());
            }
            _ => panic!("Expected Set"),
        }
        match &t.statements[1] {
            Statement::Set(set) => {
                assert_eq!(set.target.name, "n");
                assert_eq!(set.op, SetOp::Decrement);
                assert!(set.value.is_none());
            }
            _ => panic!("Expected Set"),
        }
    }

    #[test]
    fn test_invalid_assignments() {
        for src in [
            "{% set %}",
            "{% set 1 = 2 %}",
            "{% set x %}",
            "{% set x = %}",
            "{% set x++ 1 %}",
            "{% set x * 2 %}",
        ] {
            assert!(
                matches!(parse_str(src), Err(ParseError::InvalidAssignment { .. })),
                "{}",
                src
            );
        }
    }

    #[test]
    fn test_include() {
        let t = tree(r#"{% include "header.html" with title = "Home"; n++ %}"#);
        match &t.statements[0] {
            Statement::Include(inc) => {
                assert_eq!(inc.template, "header.html");
                assert_eq!(inc.params.len(), 2);
                assert_eq!(inc.params[0].target.name, "title");
                assert_eq!(inc.params[1].op, SetOp::Increment);
            }
            _ => panic!("Expected Include"),
        }
        match &tree("{% include 'x' %}").statements[0] {
            Statement::Include(inc) => assert!(inc.params.is_empty()),
            _ => panic!("Expected Include"),
        }
        assert!(matches!(
            parse_str(r#"{% include "a" with %}"#),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("{% include name %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_extend_placement() {
        let t = tree("\n  {% extend \"base.html\" %}{% block a %}{% endblock %}");
        assert_eq!(
            t.extend,
            Some(ExtendStmt {
                template: "base.html".to_string()
            })
        );
        assert_eq!(t.statements.len(), 2);

        for src in [
            r#"{% extend "a" %}{% extend "b" %}"#,
            r#"x{% extend "a" %}"#,
            r#"{% block b %}{% extend "a" %}{% endblock %}"#,
            r#"{{ v }}{% extend "a" %}"#,
        ] {
            assert!(
                matches!(parse_str(src), Err(ParseError::UnexpectedToken { .. })),
                "{}",
                src
            );
        }
    }

    #[test]
    fn test_unclosed_block_is_fatal() {
        assert_eq!(
            parse_str("{% if a %}x"),
            Err(ParseError::UnexpectedEndOfFile {
                line: 1,
                unclosed: Some("if")
            })
        );
        assert!(matches!(
            parse_str("{% for x %}\n{% block b %}{% endblock %}\n"),
            Err(ParseError::UnexpectedEndOfFile {
                line: 3,
                unclosed: Some("for")
            })
        ));
    }

    #[test]
    fn test_closers_must_match_innermost() {
        for src in [
            "{% endif %}",
            "{% if a %}{% for b %}{% endif %}{% endfor %}",
            "{% block a %}{% endfor %}",
            "{% elseif a %}",
            "{% for x %}{% else %}{% endfor %}",
            "{% if a %}{% else %}{% else %}{% endif %}",
            "{% if a %}{% else %}{% elseif b %}{% endif %}",
            "{% if a %}{% endif x %}",
        ] {
            assert!(
                matches!(parse_str(src), Err(ParseError::UnexpectedToken { .. })),
                "{}",
                src
            );
        }
    }

    #[test]
    fn test_unknown_tag_and_empty_expression() {
        assert_eq!(
            parse_str("{% while x %}"),
            Err(ParseError::UnexpectedToken {
                found: "name `while`".to_string(),
                line: 1
            })
        );
        assert_eq!(
            parse_str("\n{{ }}"),
            Err(ParseError::UnexpectedToken {
                found: "end of print statement `}}`".to_string(),
                line: 2
            })
        );
        assert!(matches!(
            parse_str("{% if %}{% endif %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("{% %}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_expression_errors_surface() {
        assert!(matches!(
            parse_str("{{ 1 + }}"),
            Err(ParseError::Expression(_))
        ));
        assert!(matches!(
            parse_str("{{ a and b }}"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_adjacent_text_merges() {
        let t = tree("a{# c #}b{% verbatim %}{{ c }}{% endverbatim %}d@{{ e }}");
        assert_eq!(t.statements, vec![text("ab{{ c }}d{{ e }}")]);
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let src = "{% if a %}{% for i = 0; i < n; i++ %}{{ xs[i] }}{% endfor %}{% endif %}";
        assert_eq!(tree(src), tree(src));
    }
}
