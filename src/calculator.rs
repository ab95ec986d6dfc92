// 🧮 Calculator - Reverse Polish Notation evaluation
// Pure stack machine: whitespace-separated tokens in, one f64 (or a classified error) out

use crate::telemetry::{NullSink, TelemetrySink};
use std::fmt;
use thiserror::Error;

// ============================================================================
// OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    /// Apply `a OP b`. `a` is the older stack entry.
    /// Operands are finite, so a non-finite outcome can only mean overflow.
    pub fn apply(&self, a: f64, b: f64) -> Result<f64, EvalError> {
        let value = match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a / b
            }
        };

        if !value.is_finite() {
            return Err(EvalError::Overflow(*self));
        }
        Ok(value)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

pub fn is_operator(token: &str) -> bool {
    Operator::from_token(token).is_some()
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid expression: not enough operands for operator {0}")]
    InsufficientOperands(Operator),

    #[error("Division by zero")]
    DivisionByZero,

    /// Result left the finite f64 range; it could be neither stored nor sent as JSON
    #[error("Arithmetic overflow: operator {0} produced a non-finite result")]
    Overflow(Operator),

    /// Carries the final stack size (0 for empty input, >1 for leftovers)
    #[error("Invalid expression: stack has {0} items after evaluation")]
    MalformedExpression(usize),
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Evaluate an RPN expression such as `"3 4 +"`.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    evaluate_with(expression, &NullSink)
}

/// Same as [`evaluate`], reporting each step to `sink`.
pub fn evaluate_with(expression: &str, sink: &dyn TelemetrySink) -> Result<f64, EvalError> {
    sink.evaluation_started(expression);

    let result = run(expression, sink);
    match &result {
        Ok(value) => sink.evaluation_completed(expression, *value),
        Err(e) => sink.evaluation_failed(expression, e),
    }
    result
}

fn run(expression: &str, sink: &dyn TelemetrySink) -> Result<f64, EvalError> {
    let mut stack: Vec<f64> = Vec::new();

    for token in expression.split_whitespace() {
        sink.token_processed(token, &stack);

        if let Some(op) = Operator::from_token(token) {
            // b is on top, a beneath it: "a b OP" => a OP b
            let (b, a) = match (stack.pop(), stack.pop()) {
                (Some(b), Some(a)) => (b, a),
                _ => return Err(EvalError::InsufficientOperands(op)),
            };

            let value = op.apply(a, b)?;
            sink.operation_applied(a, op, b, value);
            stack.push(value);
        } else {
            // "inf" and "NaN" parse as f64 but are not numbers we can keep
            let value = token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| EvalError::InvalidToken(token.to_string()))?;
            sink.operand_pushed(value);
            stack.push(value);
        }
    }

    match stack.as_slice() {
        [value] => Ok(*value),
        _ => Err(EvalError::MalformedExpression(stack.len())),
    }
}
