use utpl::error::{LexError, ParseError, SyntaxError};
use utpl::tpl::ast::{BinaryOp, ElseBranch, Expression, Statement};
use utpl::tpl::{self, TokenKind};
use utpl::{Source, TplError};

const PAGE: &str = r#"{% extend "layout.html" %}
{# page body #}
{% block content %}
  <h1>{{ title }}</h1>
  {% set count = 0 %}
  {% range _, item = items %}
    {% if item.price * 2 >= limit %}
      <b>{{ fmt.money(item.price, "USD") }}</b>
    {% elseif item.tags[0] == "new" %}
      new
    {% else %}
      {{ item.name }}
    {% endif %}
    {% set count++ %}
  {% endrange %}
  {% for i = 0; i < len(rows); i++ %}{{ rows[i][0] }}{% endfor %}
  {% include "footer.html" with year = 2024; owner = site.owner %}
  @{{ not a tag }}
  {% verbatim %}{% raw %}{% endverbatim %}
{% endblock %}
"#;

fn compile(text: &str) -> Result<tpl::Tree, TplError> {
    tpl::compile(&Source::new("page.html", text))
}

#[test]
fn test_compile_full_page() {
    let tree = compile(PAGE).unwrap();

    assert_eq!(tree.extend.as_ref().unwrap().template, "layout.html");
    let block = tree.block("content").expect("content block");

    let range = block
        .body
        .iter()
        .find_map(|s| match s {
            Statement::Range(r) => Some(r),
            _ => None,
        })
        .expect("range statement");
    assert!(range.key.is_none());
    assert_eq!(range.value.as_ref().unwrap().name, "item");

    let cond = range
        .body
        .iter()
        .find_map(|s| match s {
            Statement::If(i) => Some(i),
            _ => None,
        })
        .expect("if statement");
    assert_eq!(
        cond.cond,
        Expression::binary(
            BinaryOp::Ge,
            Expression::binary(
                BinaryOp::Mul,
                Expression::ident("item.price"),
                Expression::number("2")
            ),
            Expression::ident("limit")
        )
    );
    match cond.else_branch.as_deref() {
        Some(ElseBranch::If(elseif)) => {
            assert!(matches!(
                elseif.else_branch.as_deref(),
                Some(ElseBranch::Else { .. })
            ));
        }
        _ => panic!("Expected elseif"),
    }

    let texts: String = block
        .body
        .iter()
        .filter_map(|s| match s {
            Statement::Text { literal } => Some(literal.as_str()),
            _ => None,
        })
        .collect();
    assert!(texts.contains("{{ not a tag }}"));
    assert!(texts.contains("{% raw %}"));
    assert!(!texts.contains("page body"));
}

#[test]
fn test_printed_tree_compiles_to_the_same_tree() {
    let tree = compile(PAGE).unwrap();
    let printed = tree.to_string();
    let again = compile(&printed).unwrap();
    assert_eq!(again, tree);
    assert_eq!(again.to_string(), printed);
}

#[test]
fn test_escaped_verbatim_closer_survives_printing() {
    for text in [
        "a @{% endverbatim %} b",
        "@{%endverbatim%}@{{ x }}",
        "{% verbatim %}{%{% endverbatim %}",
    ] {
        let tree = compile(text).unwrap();
        let again = compile(&tree.to_string()).unwrap();
        assert_eq!(again, tree, "{}", text);
    }

    let tree = compile("a @{% endverbatim %} b").unwrap();
    assert_eq!(
        tree.statements,
        vec![Statement::Text {
            literal: "a {% endverbatim %} b".to_string()
        }]
    );
}

#[test]
fn test_compile_is_idempotent() {
    assert_eq!(compile(PAGE).unwrap(), compile(PAGE).unwrap());
}

#[test]
fn test_comment_elision() {
    let source = Source::new("c.html", "{# anything #}");
    let stream = tpl::tokenize(&source).unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.tokens()[0].kind, TokenKind::Eof);
    assert!(tpl::parse(stream).unwrap().statements.is_empty());
}

#[test]
fn test_json_dump() {
    let tree = compile("{% if a %}{{ f(x, 1) }}{% endif %}").unwrap();
    let json: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();
    let stmt = &json["statements"][0];
    assert_eq!(stmt["type"], "If");
    assert_eq!(stmt["cond"]["name"], "a");
    let call = &stmt["body"][0]["expr"];
    assert_eq!(call["type"], "Call");
    assert_eq!(call["function"]["name"], "f");
    assert_eq!(call["args"]["items"][1]["text"], "1");
}

#[test]
fn test_diagnostic_points_at_the_failing_line() {
    let text = "line 1\n{% if a %}\n  x\n  {{ 1 + }}\n{% endif %}\nline 6\nline 7";
    match compile(text) {
        Err(TplError::Syntax(d)) => {
            assert_eq!(d.identity, "page.html");
            assert_eq!(d.line, 4);
            assert!(matches!(
                d.cause,
                SyntaxError::Parse(ParseError::Expression(_))
            ));
            let numbers: Vec<usize> = d.context.iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![2, 3, 4, 5, 6]);
            assert!(d.context.iter().filter(|l| l.flagged).all(|l| l.number == 4));
            assert!(d.to_string().starts_with("page.html:4: "));
            assert!(d.render().contains("> 4 |   {{ 1 + }}"));
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_lex_errors_carry_lines() {
    match compile("a\nb\n{{ f(x }}") {
        Err(TplError::Syntax(d)) => {
            assert_eq!(
                d.cause,
                SyntaxError::Lex(LexError::UnclosedBracket {
                    bracket: '(',
                    line: 3
                })
            );
            assert_eq!(d.line, 3);
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_unclosed_block_reports_end_of_file() {
    match compile("{% if a %}\nx\n") {
        Err(TplError::Syntax(d)) => {
            assert_eq!(
                d.cause,
                SyntaxError::Parse(ParseError::UnexpectedEndOfFile {
                    line: 3,
                    unclosed: Some("if")
                })
            );
            assert_eq!(
                d.message(),
                "unexpected end of template, `if` is never closed"
            );
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_context_radius_is_configurable() {
    let source = Source::new("r.html", "1\n2\n3\n{{ }}\n5\n6\n7");
    match tpl::compile_with(&source, 0) {
        Err(TplError::Syntax(d)) => {
            assert_eq!(d.context.len(), 1);
            assert_eq!(d.context[0].text, "{{ }}");
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}
