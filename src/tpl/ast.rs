use std::fmt;

use serde::Serialize;

use crate::error::TplError;

/// A dotted-path name such as `user.profile.name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub name: String,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiteralKind {
    Number,
    String,
}

/// A number keeps its source text; a string is stored unquoted and unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
}

/// The fixed set of binary operators the expression engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::Ne),
            ">" => Some(BinaryOp::Gt),
            ">=" => Some(BinaryOp::Ge),
            "<" => Some(BinaryOp::Lt),
            "<=" => Some(BinaryOp::Le),
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            "%" => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn priority(self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Lt
            | BinaryOp::Le => 0,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }
}

/// Priority of the index bracket, tighter than any binary operator.
pub const INDEX_PRIORITY: u8 = 15;

/// Arguments of a call in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ArgList {
    pub items: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Call {
        function: Identifier,
        args: Option<ArgList>,
    },
}

impl Expression {
    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(Identifier::new(name))
    }

    pub fn number(text: impl Into<String>) -> Self {
        Expression::Literal(Literal {
            kind: LiteralKind::Number,
            text: text.into(),
        })
    }

    pub fn string(text: impl Into<String>) -> Self {
        Expression::Literal(Literal {
            kind: LiteralKind::String,
            text: text.into(),
        })
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn index(base: Expression, index: Expression) -> Self {
        Expression::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// A call; an empty argument vector means no argument list at all.
    pub fn call(function: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            function: Identifier::new(function),
            args: (!args.is_empty()).then_some(ArgList { items: args }),
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => op.priority(),
            _ => INDEX_PRIORITY,
        }
    }
}

/// Operator of a `set` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetOp {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    AddAssign,
    #[serde(rename = "-=")]
    SubAssign,
    #[serde(rename = "++")]
    Increment,
    #[serde(rename = "--")]
    Decrement,
}

impl SetOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(SetOp::Assign),
            "+=" => Some(SetOp::AddAssign),
            "-=" => Some(SetOp::SubAssign),
            "++" => Some(SetOp::Increment),
            "--" => Some(SetOp::Decrement),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            SetOp::Assign => "=",
            SetOp::AddAssign => "+=",
            SetOp::SubAssign => "-=",
            SetOp::Increment => "++",
            SetOp::Decrement => "--",
        }
    }

    /// `++` and `--` take no right-hand side.
    pub fn takes_value(self) -> bool {
        !matches!(self, SetOp::Increment | SetOp::Decrement)
    }
}

/// `target op [value]`; `value` is `None` exactly when `op` is `++` or `--`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetStmt {
    pub target: Identifier,
    pub op: SetOp,
    pub value: Option<Expression>,
}

/// One link of an `if` / `elseif` / `else` chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IfStmt {
    pub cond: Expression,
    pub body: Vec<Statement>,
    pub else_branch: Option<Box<ElseBranch>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ElseBranch {
    /// `elseif`
    If(IfStmt),
    Else { body: Vec<Statement> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForStmt {
    pub init: Option<SetStmt>,
    pub cond: Option<Expression>,
    pub post: Option<SetStmt>,
    pub body: Vec<Statement>,
}

/// `range key[, value] = source`; a `_` binding is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeStmt {
    pub key: Option<Identifier>,
    pub value: Option<Identifier>,
    pub source: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStmt {
    pub name: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeStmt {
    pub template: String,
    pub params: Vec<SetStmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendStmt {
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Statement {
    Text { literal: String },
    Value { expr: Expression },
    Set(SetStmt),
    If(IfStmt),
    For(ForStmt),
    Range(RangeStmt),
    Block(BlockStmt),
    Include(IncludeStmt),
}

/// The parsed form of one template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Tree {
    pub statements: Vec<Statement>,
    pub extend: Option<ExtendStmt>,
}

impl Tree {
    /// Pretty JSON dump of the tree, for debugging and tooling.
    pub fn to_json(&self) -> Result<String, TplError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Finds a named block anywhere in the tree, outermost first.
    pub fn block(&self, name: &str) -> Option<&BlockStmt> {
        find_block(&self.statements, name)
    }
}

fn find_block<'a>(statements: &'a [Statement], name: &str) -> Option<&'a BlockStmt> {
    statements.iter().find_map(|stmt| match stmt {
        Statement::Block(block) if block.name == name => Some(block),
        Statement::Block(block) => find_block(&block.body, name),
        Statement::For(stmt) => find_block(&stmt.body, name),
        Statement::Range(stmt) => find_block(&stmt.body, name),
        Statement::If(stmt) => find_block_in_if(stmt, name),
        _ => None,
    })
}

fn find_block_in_if<'a>(stmt: &'a IfStmt, name: &str) -> Option<&'a BlockStmt> {
    find_block(&stmt.body, name).or_else(|| match stmt.else_branch.as_deref()? {
        ElseBranch::If(next) => find_block_in_if(next, name),
        ElseBranch::Else { body } => find_block(body, name),
    })
}

// --- Display: re-serialization to template syntax ---

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Statement]) -> fmt::Result {
    for stmt in body {
        write!(f, "{}", stmt)?;
    }
    Ok(())
}

/// Text that would lex as (or run into) a tag has to be printed raw.
fn needs_verbatim(text: &str) -> bool {
    ["{{", "{%", "{#"].iter().any(|m| text.contains(m)) || text.ends_with(['{', '@'])
}

/// Prints `text` inside verbatim blocks. Each `{%` is split between two
/// blocks so no block body can contain its own closer; the parser merges
/// the pieces back into one text node.
fn write_verbatim(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("{% verbatim %}")?;
    for (i, piece) in text.split("{%").enumerate() {
        if i > 0 {
            f.write_str("{{% endverbatim %}{% verbatim %}%")?;
        }
        f.write_str(piece)?;
    }
    f.write_str("{% endverbatim %}")
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LiteralKind::Number => f.write_str(&self.text),
            LiteralKind::String => write_quoted(f, &self.text),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(ident) => write!(f, "{}", ident),
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Binary { op, left, right } => {
                // Same-priority operators group to the left.
                if left.priority() < op.priority() {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op)?;
                if right.priority() <= op.priority() {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
            Expression::Index { base, index } => {
                if base.priority() < INDEX_PRIORITY {
                    write!(f, "({})[{}]", base, index)
                } else {
                    write!(f, "{}[{}]", base, index)
                }
            }
            Expression::Call { function, args } => match args {
                Some(args) => write!(f, "{}({})", function, args),
                None => write!(f, "{}()", function),
            },
        }
    }
}

impl fmt::Display for SetStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} {}", self.target, self.op.symbol(), value),
            None => write!(f, "{}{}", self.target, self.op.symbol()),
        }
    }
}

impl fmt::Display for IfStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{% if {} %}}", self.cond)?;
        write_body(f, &self.body)?;
        let mut branch = self.else_branch.as_deref();
        while let Some(next) = branch {
            match next {
                ElseBranch::If(stmt) => {
                    write!(f, "{{% elseif {} %}}", stmt.cond)?;
                    write_body(f, &stmt.body)?;
                    branch = stmt.else_branch.as_deref();
                }
                ElseBranch::Else { body } => {
                    f.write_str("{% else %}")?;
                    write_body(f, body)?;
                    branch = None;
                }
            }
        }
        f.write_str("{% endif %}")
    }
}

impl fmt::Display for ForStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<String>| v.unwrap_or_default();
        if self.init.is_none() && self.post.is_none() {
            write!(f, "{{% for {} %}}", show(self.cond.as_ref().map(|c| c.to_string())))?;
        } else {
            write!(
                f,
                "{{% for {}; {}; {} %}}",
                show(self.init.as_ref().map(|s| s.to_string())),
                show(self.cond.as_ref().map(|c| c.to_string())),
                show(self.post.as_ref().map(|s| s.to_string())),
            )?;
        }
        write_body(f, &self.body)?;
        f.write_str("{% endfor %}")
    }
}

impl fmt::Display for RangeStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |ident: &Option<Identifier>| {
            ident
                .as_ref()
                .map_or_else(|| "_".to_string(), |i| i.name.clone())
        };
        match &self.value {
            Some(_) => write!(
                f,
                "{{% range {}, {} = {} %}}",
                name(&self.key),
                name(&self.value),
                self.source
            )?,
            None => write!(f, "{{% range {} = {} %}}", name(&self.key), self.source)?,
        }
        write_body(f, &self.body)?;
        f.write_str("{% endrange %}")
    }
}

impl fmt::Display for BlockStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{% block {} %}}", self.name)?;
        write_body(f, &self.body)?;
        f.write_str("{% endblock %}")
    }
}

impl fmt::Display for IncludeStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{% include ")?;
        write_quoted(f, &self.template)?;
        for (i, param) in self.params.iter().enumerate() {
            let sep = if i == 0 { " with " } else { "; " };
            write!(f, "{}{}", sep, param)?;
        }
        f.write_str(" %}")
    }
}

impl fmt::Display for ExtendStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{% extend ")?;
        write_quoted(f, &self.template)?;
        f.write_str(" %}")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Text { literal } if needs_verbatim(literal) => write_verbatim(f, literal),
            Statement::Text { literal } => f.write_str(literal),
            Statement::Value { expr } => write!(f, "{{{{ {} }}}}", expr),
            Statement::Set(stmt) => write!(f, "{{% set {} %}}", stmt),
            Statement::If(stmt) => write!(f, "{}", stmt),
            Statement::For(stmt) => write!(f, "{}", stmt),
            Statement::Range(stmt) => write!(f, "{}", stmt),
            Statement::Block(stmt) => write!(f, "{}", stmt),
            Statement::Include(stmt) => write!(f, "{}", stmt),
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(extend) = &self.extend {
            write!(f, "{}", extend)?;
        }
        write_body(f, &self.statements)
    }
}
