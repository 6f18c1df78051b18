//! Tiny parser for energy expressions written in index notation.
//!
//! An expression is parsed against a set of declarations, given as three strings:
//!
//! ```text
//! indices:   "I J"
//! sizes:     "Dim1 Dim2"
//! variables: "a U[Dim2] V[Dim1] D[Dim1,Dim2]"
//! ```
//!
//! Index `I` ranges over `Dim1`, index `J` over `Dim2`, and the variables are a scalar `a`,
//! two vectors and a matrix. Named sizes are bound with [`Declarations::with_size`], integer
//! literals may be used in their place. With `Dim1 = Dim2 = 2`, the expression
//!
//! ```text
//! a + D[I,J]*U[J]*V[I]
//! ```
//!
//! evaluates to $a + \sum_{I,J} D_{IJ} U_J V_I$.
//!
//! # Summation convention
//!
//! Every index name is summed over exactly once, in the innermost product that binds it. A
//! product (a chain of `*` and `/`) binds an index if the index appears directly in one of
//! its tensor accesses (possibly raised to a power or negated), or if it appears in at least
//! two of its factors. Parentheses, function arguments and exponents start a new scope for
//! indices that the enclosing product does not bind. Hence `U[I]*U[I]` and `U[I]^2` both
//! denote $\sum_I U_I^2$, `sqrt(U[I]*U[I])` denotes the Euclidean norm of `U`, and in
//! `(U[I] + W[I])*V[I]` the sum over `I` encloses the whole product.
//!
//! Expressions are evaluated with any [`Number`], so that parsed expressions can be
//! differentiated with dual numbers.

use adform_traits::nalgebra;
use adform_traits::Number;
use core::fmt;
use core::fmt::{Display, Formatter};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    error: String,
}

impl ParseError {
    fn from_string(error: String) -> Self {
        Self { error }
    }

    fn unexpected_character(c: char, position: usize) -> Self {
        ParseError::from_string(format!("Unexpected character '{}' at position {}", c, position))
    }

    fn unexpected_token(found: Option<&Token>, expected: &str) -> Self {
        match found {
            Some(token) => ParseError::from_string(format!("Expected {}, found {}", expected, token)),
            None => ParseError::from_string(format!("Expected {}, found end of input", expected)),
        }
    }

    fn unknown(kind: &str, name: &str) -> Self {
        ParseError::from_string(format!("Unknown {} \"{}\"", kind, name))
    }

    fn duplicate(kind: &str, name: &str) -> Self {
        ParseError::from_string(format!("Duplicate {} \"{}\"", kind, name))
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(x) => write!(f, "number {}", x),
            Token::Identifier(name) => write!(f, "identifier \"{}\"", name),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::LeftBracket => write!(f, "'['"),
            Token::RightBracket => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

/// Splits the input into tokens. Whitespace only separates tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ',' => Token::Comma,
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = position;
                let mut previous = None;
                while let Some(&(i, c)) = chars.peek() {
                    let exponent_sign = matches!(previous, Some('e') | Some('E')) && (c == '+' || c == '-');
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                        end = i + c.len_utf8();
                        previous = Some(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[position..end];
                let value = literal.parse::<f64>().map_err(|err| {
                    ParseError::from_string(format!("Failed to parse {} as f64: {}", literal, err))
                })?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = position;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Identifier(input[position..end].to_string()));
                continue;
            }
            c => return Err(ParseError::unexpected_character(c, position)),
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

/// A size that is either given directly or by a name bound later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extent {
    Fixed(usize),
    Named(String),
}

impl Display for Extent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Fixed(value) => write!(f, "{}", value),
            Extent::Named(name) => write!(f, "\"{}\"", name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDeclaration {
    pub name: String,
    pub size: Extent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableDeclaration {
    pub name: String,
    pub extents: Vec<Extent>,
}

/// Index, size and variable declarations that expressions are parsed against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declarations {
    indices: Vec<IndexDeclaration>,
    variables: Vec<VariableDeclaration>,
    sizes: Vec<(String, usize)>,
}

fn expect_integer(token: Option<&Token>, what: &str) -> Result<usize, ParseError> {
    match token {
        Some(&Token::Number(x)) if x >= 0.0 && x.fract() == 0.0 => Ok(x as usize),
        other => Err(ParseError::unexpected_token(other, what)),
    }
}

fn parse_extent(token: Option<&Token>) -> Result<Extent, ParseError> {
    match token {
        Some(Token::Identifier(name)) => Ok(Extent::Named(name.clone())),
        other => expect_integer(other, "size name or integer").map(Extent::Fixed),
    }
}

/// Parses the declaration strings.
///
/// `indices` and `sizes` are whitespace-separated lists of equal length, where the `k`-th index
/// ranges over the `k`-th size. `variables` lists variables, each either a bare name (scalar)
/// or a name followed by a bracketed, comma-separated list of sizes.
pub fn parse_declarations(indices: &str, sizes: &str, variables: &str) -> Result<Declarations, ParseError> {
    let index_tokens = tokenize(indices)?;
    let size_tokens = tokenize(sizes)?;
    if index_tokens.len() != size_tokens.len() {
        return Err(ParseError::from_string(format!(
            "Found {} indices, but {} sizes",
            index_tokens.len(),
            size_tokens.len()
        )));
    }

    let mut declarations = Declarations::default();
    for (index, size) in index_tokens.iter().zip(&size_tokens) {
        let name = match index {
            Token::Identifier(name) => name.clone(),
            other => return Err(ParseError::unexpected_token(Some(other), "index name")),
        };
        if declarations.indices.iter().any(|decl| decl.name == name) {
            return Err(ParseError::duplicate("index", &name));
        }
        let size = parse_extent(Some(size))?;
        declarations.indices.push(IndexDeclaration { name, size });
    }

    let tokens = tokenize(variables)?;
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        let name = match token {
            Token::Identifier(name) => name.clone(),
            other => return Err(ParseError::unexpected_token(Some(other), "variable name")),
        };
        if declarations.variables.iter().any(|decl| decl.name == name)
            || declarations.indices.iter().any(|decl| decl.name == name)
        {
            return Err(ParseError::duplicate("name", &name));
        }

        let mut extents = Vec::new();
        if iter.peek() == Some(&&Token::LeftBracket) {
            iter.next();
            loop {
                extents.push(parse_extent(iter.next())?);
                match iter.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RightBracket) => break,
                    other => return Err(ParseError::unexpected_token(other, "',' or ']'")),
                }
            }
        }
        declarations
            .variables
            .push(VariableDeclaration { name, extents });
    }

    Ok(declarations)
}

impl Declarations {
    /// Binds a named size to a value.
    pub fn with_size(mut self, name: impl Into<String>, value: usize) -> Self {
        let name = name.into();
        self.sizes.retain(|(existing, _)| existing != &name);
        self.sizes.push((name, value));
        self
    }

    pub fn indices(&self) -> &[IndexDeclaration] {
        &self.indices
    }

    pub fn variables(&self) -> &[VariableDeclaration] {
        &self.variables
    }

    pub fn size(&self, name: &str) -> Option<usize> {
        self.sizes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|&(_, value)| value)
    }

    fn resolve(&self, extent: &Extent) -> Result<usize, ParseError> {
        let value = match extent {
            Extent::Fixed(value) => *value,
            Extent::Named(name) => self
                .size(name)
                .ok_or_else(|| ParseError::from_string(format!("Size \"{}\" is not bound", name)))?,
        };
        if value == 0 {
            return Err(ParseError::from_string(format!("Size {} must be positive", extent)));
        }
        Ok(value)
    }
}

/// A variable of a parsed expression with resolved extents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub extents: Vec<usize>,
}

impl Variable {
    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Sinh,
    Cosh,
    Tanh,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        use Function::*;
        let function = match name {
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "exp" => Exp,
            "log" => Log,
            "sqrt" => Sqrt,
            "abs" => Abs,
            "sinh" => Sinh,
            "cosh" => Cosh,
            "tanh" => Tanh,
            _ => return None,
        };
        Some(function)
    }

    fn apply<N: Number>(self, x: N) -> N {
        use Function::*;
        match self {
            Sin => x.sin(),
            Cos => x.cos(),
            Tan => x.tan(),
            Exp => x.exp(),
            Log => x.ln(),
            Sqrt => x.sqrt(),
            Abs => x.abs(),
            Sinh => x.sinh(),
            Cosh => x.cosh(),
            Tanh => x.tanh(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subscript {
    Fixed(usize),
    Index(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Constant(f64),
    Access {
        variable: usize,
        subscripts: Vec<Subscript>,
        strides: Vec<usize>,
    },
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Power(Box<Node>, Box<Node>),
    Call(Function, Box<Node>),
    Group(Box<Node>),
    Sum {
        index: usize,
        range: usize,
        body: Box<Node>,
    },
}

impl Node {
    fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Node::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn collect_indices(&self, indices: &mut BTreeSet<usize>) {
        match self {
            Node::Constant(_) => {}
            Node::Access { subscripts, .. } => {
                indices.extend(subscripts.iter().filter_map(|s| match s {
                    Subscript::Index(index) => Some(*index),
                    Subscript::Fixed(_) => None,
                }))
            }
            Node::Negate(x) | Node::Call(_, x) | Node::Group(x) => x.collect_indices(indices),
            Node::Binary(_, a, b) | Node::Power(a, b) => {
                a.collect_indices(indices);
                b.collect_indices(indices);
            }
            Node::Sum { body, index, .. } => {
                let mut inner = BTreeSet::new();
                body.collect_indices(&mut inner);
                inner.remove(index);
                indices.extend(inner);
            }
        }
    }

    /// Indices that a product containing this node as a factor binds on its behalf.
    fn collect_direct_indices(&self, indices: &mut BTreeSet<usize>) {
        match self {
            Node::Access { .. } => self.collect_indices(indices),
            Node::Negate(x) | Node::Power(x, _) => x.collect_direct_indices(indices),
            _ => {}
        }
    }

    /// The value of a literal, possibly parenthesized or negated.
    fn constant_value(&self) -> Option<f64> {
        match self {
            Node::Constant(c) => Some(*c),
            Node::Group(x) => x.constant_value(),
            Node::Negate(x) => x.constant_value().map(|c| -c),
            _ => None,
        }
    }

    fn into_factors(self, factors: &mut Vec<(BinaryOp, Node)>, op: BinaryOp) {
        match self {
            Node::Binary(inner @ (BinaryOp::Mul | BinaryOp::Div), a, b) => {
                a.into_factors(factors, op);
                b.into_factors(factors, inner);
            }
            other => factors.push((op, other)),
        }
    }

    fn evaluate<N, F>(&self, values: &F, env: &mut [usize]) -> N
    where
        N: Number,
        F: Fn(usize, usize) -> N,
    {
        match self {
            Node::Constant(c) => N::from_f64(*c),
            Node::Access {
                variable,
                subscripts,
                strides,
            } => {
                let offset = subscripts
                    .iter()
                    .zip(strides)
                    .map(|(subscript, stride)| match subscript {
                        Subscript::Fixed(i) => i * stride,
                        Subscript::Index(index) => env[*index] * stride,
                    })
                    .sum();
                values(*variable, offset)
            }
            Node::Negate(x) => -x.evaluate(values, env),
            Node::Binary(op, a, b) => {
                let a = a.evaluate(values, env);
                let b = b.evaluate(values, env);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                }
            }
            Node::Power(base, exponent) => {
                let base = base.evaluate(values, env);
                match exponent.constant_value() {
                    Some(c) if c.fract() == 0.0 && c.abs() <= i32::MAX as f64 => base.powi(c as i32),
                    Some(c) => base.powr(nalgebra::convert(c)),
                    None => base.powf(exponent.evaluate(values, env)),
                }
            }
            Node::Call(function, x) => function.apply(x.evaluate(values, env)),
            Node::Group(x) => x.evaluate(values, env),
            Node::Sum { index, range, body } => {
                let mut sum = N::zero();
                for i in 0..*range {
                    env[*index] = i;
                    sum += body.evaluate(values, env);
                }
                sum
            }
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    declarations: &'a Declarations,
    index_ranges: Vec<usize>,
    variables: Vec<Variable>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if *token == expected => Ok(()),
            other => Err(ParseError::unexpected_token(other, &expected.to_string())),
        }
    }

    fn expression(&mut self) -> Result<Node, ParseError> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(node),
            };
            self.next();
            node = Node::binary(op, node, self.term()?);
        }
    }

    fn term(&mut self) -> Result<Node, ParseError> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(node),
            };
            self.next();
            node = Node::binary(op, node, self.unary()?);
        }
    }

    fn unary(&mut self) -> Result<Node, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(Node::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.next();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, ParseError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.next();
            let exponent = self.unary()?;
            Ok(Node::Power(Box::new(base), Box::new(exponent)))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        match self.next() {
            Some(Token::Number(x)) => Ok(Node::Constant(*x)),
            Some(Token::LeftParen) => {
                let inner = self.expression()?;
                self.expect(Token::RightParen)?;
                Ok(Node::Group(Box::new(inner)))
            }
            Some(Token::Identifier(name)) if self.peek() == Some(&Token::LeftParen) => {
                let function = Function::from_name(name).ok_or_else(|| ParseError::unknown("function", name))?;
                self.next();
                let argument = self.expression()?;
                self.expect(Token::RightParen)?;
                Ok(Node::Call(function, Box::new(argument)))
            }
            Some(Token::Identifier(name)) => self.access(name),
            other => Err(ParseError::unexpected_token(other, "number, variable, function or '('")),
        }
    }

    fn access(&mut self, name: &str) -> Result<Node, ParseError> {
        let variable = self
            .variables
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| ParseError::unknown("variable", name))?;

        let mut subscripts = Vec::new();
        if self.peek() == Some(&Token::LeftBracket) {
            self.next();
            loop {
                let subscript = match self.next() {
                    Some(Token::Identifier(index_name)) => self
                        .declarations
                        .indices
                        .iter()
                        .position(|decl| &decl.name == index_name)
                        .map(Subscript::Index)
                        .ok_or_else(|| ParseError::unknown("index", index_name))?,
                    other => Subscript::Fixed(expect_integer(other, "index name or integer")?),
                };
                subscripts.push(subscript);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RightBracket) => break,
                    other => return Err(ParseError::unexpected_token(other, "',' or ']'")),
                }
            }
        }

        let extents = &self.variables[variable].extents;
        if subscripts.len() != extents.len() {
            return Err(ParseError::from_string(format!(
                "Variable \"{}\" has rank {}, but is accessed with {} subscripts",
                name,
                extents.len(),
                subscripts.len()
            )));
        }
        for (axis, (subscript, &extent)) in subscripts.iter().zip(extents).enumerate() {
            match *subscript {
                Subscript::Fixed(i) if i >= extent => {
                    return Err(ParseError::from_string(format!(
                        "Subscript {} is out of bounds for axis {} of \"{}\" with extent {}",
                        i, axis, name, extent
                    )));
                }
                Subscript::Index(index) if self.index_ranges[index] != extent => {
                    return Err(ParseError::from_string(format!(
                        "Index \"{}\" ranges over {} values, but axis {} of \"{}\" has extent {}",
                        self.declarations.indices[index].name, self.index_ranges[index], axis, name, extent
                    )));
                }
                _ => {}
            }
        }

        let mut strides = vec![1; extents.len()];
        for axis in (0..extents.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * extents[axis + 1];
        }

        Ok(Node::Access {
            variable,
            subscripts,
            strides,
        })
    }

    /// Rewrites an additive expression so that each of its products binds its indices.
    fn bind_sum(&self, node: Node, bound: &BTreeSet<usize>) -> Node {
        match node {
            Node::Binary(op @ (BinaryOp::Add | BinaryOp::Sub), a, b) => {
                Node::binary(op, self.bind_sum(*a, bound), self.bind_sum(*b, bound))
            }
            other => self.bind_product(other, bound),
        }
    }

    fn bind_product(&self, node: Node, bound: &BTreeSet<usize>) -> Node {
        let mut factors = Vec::new();
        node.into_factors(&mut factors, BinaryOp::Mul);

        let mut binds = BTreeSet::new();
        let mut seen = BTreeSet::new();
        for (_, factor) in &factors {
            factor.collect_direct_indices(&mut binds);
            let mut indices = BTreeSet::new();
            factor.collect_indices(&mut indices);
            for index in indices {
                if !seen.insert(index) {
                    binds.insert(index);
                }
            }
        }
        let binds: BTreeSet<usize> = binds.difference(bound).copied().collect();
        let inner_bound: BTreeSet<usize> = bound.union(&binds).copied().collect();

        let mut product: Option<Node> = None;
        for (op, factor) in factors {
            let factor = self.bind_factor(factor, &inner_bound);
            product = Some(match product {
                None => factor,
                Some(lhs) => Node::binary(op, lhs, factor),
            });
        }
        let mut node = product.unwrap_or(Node::Constant(1.0));

        for &index in binds.iter().rev() {
            node = Node::Sum {
                index,
                range: self.index_ranges[index],
                body: Box::new(node),
            };
        }
        node
    }

    fn bind_factor(&self, node: Node, bound: &BTreeSet<usize>) -> Node {
        match node {
            Node::Negate(x) => Node::Negate(Box::new(self.bind_factor(*x, bound))),
            Node::Power(base, exponent) => Node::Power(
                Box::new(self.bind_factor(*base, bound)),
                Box::new(self.bind_sum(*exponent, bound)),
            ),
            Node::Group(x) => Node::Group(Box::new(self.bind_sum(*x, bound))),
            Node::Call(function, x) => Node::Call(function, Box::new(self.bind_sum(*x, bound))),
            other => other,
        }
    }
}

/// A scalar expression in index notation.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    variables: Vec<Variable>,
    num_indices: usize,
    root: Node,
}

impl Expression {
    /// Parses an expression against the given declarations.
    ///
    /// Every size used by the declarations must be bound. Unknown names, rank mismatches,
    /// out-of-bounds integer subscripts and indices whose range differs from the extent of the
    /// axis they subscript are reported as errors.
    pub fn parse(declarations: &Declarations, expression: &str) -> Result<Self, ParseError> {
        let index_ranges = declarations
            .indices
            .iter()
            .map(|decl| declarations.resolve(&decl.size))
            .collect::<Result<Vec<_>, _>>()?;
        let variables = declarations
            .variables
            .iter()
            .map(|decl| {
                Ok(Variable {
                    name: decl.name.clone(),
                    extents: decl
                        .extents
                        .iter()
                        .map(|extent| declarations.resolve(extent))
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            position: 0,
            declarations,
            index_ranges,
            variables,
        };
        let root = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(ParseError::unexpected_token(Some(token), "operator or end of input"));
        }
        let root = parser.bind_sum(root, &BTreeSet::new());

        Ok(Self {
            source: expression.to_string(),
            variables: parser.variables,
            num_indices: declarations.indices.len(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The declared variables, in declaration order.
    ///
    /// The variable indices passed to the closure in [`Expression::evaluate`] refer to this
    /// slice.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Evaluates the expression.
    ///
    /// `values(variable, offset)` must return the entry at the row-major offset `offset` of the
    /// variable with index `variable`.
    pub fn evaluate<N, F>(&self, values: F) -> N
    where
        N: Number,
        F: Fn(usize, usize) -> N,
    {
        let mut env = vec![0; self.num_indices];
        self.root.evaluate(&values, &mut env)
    }
}
