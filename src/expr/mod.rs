//! Correction-formula expressions.
//!
//! A correction file header carries a formula such as
//! `max(0.0001,[0]+[1]*log10(x))`: a function of one free variable `x` and
//! indexed parameter slots `[0]..[N-1]`. The formula is parsed once into an
//! AST; parameter values are bound by index and the tree is evaluated
//! directly (no textual substitution, no general-purpose evaluator).

use std::collections::BTreeSet;
use std::fmt::Write as _;

use thiserror::Error;

mod parser;

use parser::{BinOp, Func, Node};

/// Errors raised while parsing or evaluating a correction formula.
///
/// All variants are "malformed expression" failures from the caller's point
/// of view: the affected record is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown variable '{0}' (only `x` is defined)")]
    UnknownVariable(String),
    #[error("wrong number of arguments for '{func}': got {got}")]
    Arity { func: &'static str, got: usize },
    #[error("placeholder [{index}] has no parameter value ({available} given)")]
    UnresolvedPlaceholder { index: usize, available: usize },
    #[error("{func}({arg}) is outside the function domain")]
    Domain { func: &'static str, arg: f64 },
    #[error("division by zero")]
    DivisionByZero,
}

/// A parsed formula template.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    ast: Node,
    placeholders: BTreeSet<usize>,
}

impl Formula {
    /// Parse a formula template.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let ast = parser::parse(source)?;
        let mut placeholders = BTreeSet::new();
        collect_placeholders(&ast, &mut placeholders);
        Ok(Self {
            source: source.trim().to_string(),
            ast,
            placeholders,
        })
    }

    /// The template text as it appeared in the file.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder indices referenced by the template, ascending.
    pub fn placeholders(&self) -> Vec<usize> {
        self.placeholders.iter().copied().collect()
    }

    /// Number of parameter values needed to resolve every placeholder.
    pub fn slot_count(&self) -> usize {
        self.placeholders.last().map_or(0, |&i| i + 1)
    }

    /// Bind parameter values by index.
    ///
    /// Fails when a referenced slot has no value; extra values are ignored.
    pub fn bind<'a>(&'a self, parameters: &[f64]) -> Result<BoundFormula<'a>, ExprError> {
        if let Some(&index) = self.placeholders.iter().find(|&&i| i >= parameters.len()) {
            return Err(ExprError::UnresolvedPlaceholder {
                index,
                available: parameters.len(),
            });
        }
        Ok(BoundFormula {
            formula: self,
            parameters: parameters.to_vec(),
        })
    }
}

/// A formula with every placeholder resolved.
#[derive(Debug, Clone)]
pub struct BoundFormula<'a> {
    formula: &'a Formula,
    parameters: Vec<f64>,
}

impl BoundFormula<'_> {
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Evaluate at a single `x`.
    pub fn eval(&self, x: f64) -> Result<f64, ExprError> {
        eval_node(&self.formula.ast, x, &self.parameters)
    }

    /// Render the expression with parameter values written in place of the
    /// placeholders.
    pub fn substituted(&self) -> String {
        let mut out = String::new();
        render_node(&self.formula.ast, &self.parameters, &mut out);
        out
    }
}

/// Build a callable correction function from a template and parameters.
///
/// Construction never fails: parse errors and unresolved placeholders are
/// reported by every call of the returned function.
pub fn build(template: &str, parameters: &[f64]) -> impl Fn(f64) -> Result<f64, ExprError> + use<> {
    let formula = Formula::parse(template);
    let parameters = parameters.to_vec();
    move |x| {
        let formula = formula.as_ref().map_err(ExprError::clone)?;
        formula.bind(&parameters)?.eval(x)
    }
}

fn collect_placeholders(node: &Node, out: &mut BTreeSet<usize>) {
    match node {
        Node::Number(_) | Node::Var => {}
        Node::Param(i) => {
            out.insert(*i);
        }
        Node::Neg(a) | Node::Not(a) => collect_placeholders(a, out),
        Node::Binary(_, a, b) => {
            collect_placeholders(a, out);
            collect_placeholders(b, out);
        }
        Node::Call(_, args) => {
            for a in args {
                collect_placeholders(a, out);
            }
        }
    }
}

fn truth(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

fn eval_node(node: &Node, x: f64, params: &[f64]) -> Result<f64, ExprError> {
    let value = match node {
        Node::Number(n) => *n,
        Node::Var => x,
        Node::Param(i) => *params.get(*i).ok_or(ExprError::UnresolvedPlaceholder {
            index: *i,
            available: params.len(),
        })?,
        Node::Neg(a) => -eval_node(a, x, params)?,
        Node::Not(a) => truth(eval_node(a, x, params)? == 0.0),
        Node::Binary(op, a, b) => {
            let lhs = eval_node(a, x, params)?;
            let rhs = eval_node(b, x, params)?;
            match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div => {
                    if rhs == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    lhs / rhs
                }
                BinOp::Eq => truth(lhs == rhs),
                BinOp::Ne => truth(lhs != rhs),
                BinOp::Lt => truth(lhs < rhs),
                BinOp::Le => truth(lhs <= rhs),
                BinOp::Gt => truth(lhs > rhs),
                BinOp::Ge => truth(lhs >= rhs),
                BinOp::And => truth(lhs != 0.0 && rhs != 0.0),
                BinOp::Or => truth(lhs != 0.0 || rhs != 0.0),
            }
        }
        Node::Call(func, args) => eval_call(*func, args, x, params)?,
    };
    Ok(value)
}

fn eval_call(func: Func, args: &[Node], x: f64, params: &[f64]) -> Result<f64, ExprError> {
    let mut values = Vec::with_capacity(args.len());
    for a in args {
        values.push(eval_node(a, x, params)?);
    }
    let a0 = values[0];
    let out = match func {
        Func::Log10 | Func::Log if a0 <= 0.0 => {
            return Err(ExprError::Domain { func: func.name(), arg: a0 });
        }
        Func::Sqrt if a0 < 0.0 => {
            return Err(ExprError::Domain { func: func.name(), arg: a0 });
        }
        Func::Log10 => a0.log10(),
        Func::Log => a0.ln(),
        Func::Sqrt => a0.sqrt(),
        Func::Exp => a0.exp(),
        Func::Pow => a0.powf(values[1]),
        Func::Abs => a0.abs(),
        Func::Max => values.iter().copied().fold(a0, f64::max),
        Func::Min => values.iter().copied().fold(a0, f64::min),
    };
    if !out.is_finite() && values.iter().all(|v| v.is_finite()) {
        return Err(ExprError::Domain { func: func.name(), arg: a0 });
    }
    Ok(out)
}

fn render_node(node: &Node, params: &[f64], out: &mut String) {
    match node {
        Node::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Node::Var => out.push('x'),
        Node::Param(i) => match params.get(*i) {
            Some(v) if *v < 0.0 => {
                let _ = write!(out, "({v})");
            }
            Some(v) => {
                let _ = write!(out, "{v}");
            }
            None => {
                let _ = write!(out, "[{i}]");
            }
        },
        Node::Neg(a) => {
            out.push_str("-(");
            render_node(a, params, out);
            out.push(')');
        }
        Node::Not(a) => {
            out.push_str("!(");
            render_node(a, params, out);
            out.push(')');
        }
        Node::Binary(op, a, b) => {
            out.push('(');
            render_node(a, params, out);
            out.push_str(op.symbol());
            render_node(b, params, out);
            out.push(')');
        }
        Node::Call(func, args) => {
            out.push_str(func.name());
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_node(a, params, out);
            }
            out.push(')');
        }
    }
}
