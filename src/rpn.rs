//! Postfix filter expressions over typed operands.
//!
//! A program is a whitespace-separated token stream compiled into a
//! [`CompiledExpr`] and evaluated by [`RpnCtx`] on a stack of operands.
//! Each operand carries an integer view, a byte-string view and a
//! not-a-number flag. Register 0 holds the current node id by convention;
//! field lookups resolve through a [`FieldSource`] supplied at evaluation
//! time.

use smallvec::SmallVec;

use crate::types::{NODE_ID_SIZE, NODE_TYPE_SIZE, NodeId};

/// Inline capacity of an operand's string view.
pub const SMALL_OPERAND_SIZE: usize = 40;

/// Maximum evaluation stack depth.
const MAX_DEPTH: usize = 256;

/// Errors produced while compiling or evaluating an expression.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpnError {
    /// An allocation was refused.
    #[error("out of memory")]
    OutOfMemory,
    /// The operator exists but is not implemented.
    #[error("operation not supported")]
    NotSupported,
    /// An unknown operator letter was encountered.
    #[error("illegal operator")]
    IllegalOperator,
    /// A token was not a valid operand.
    #[error("illegal operand")]
    IllegalOperand,
    /// The stack under- or overflowed, or the program left a bad residue.
    #[error("stack error")]
    BadStack,
    /// An operand had an incompatible type for the operator.
    #[error("type error")]
    Type,
    /// A register index was out of bounds.
    #[error("register index out of bounds")]
    Bounds,
    /// A register was read before being set.
    #[error("null pointer exception")]
    NullPointer,
    /// A numeric view was required but unavailable.
    #[error("not a number")]
    Nan,
    /// Division or remainder by zero.
    #[error("divide by zero")]
    DivideByZero,
}

/// Resolves hash-field reads for the `f`/`g` lookup operators.
pub trait FieldSource {
    /// Returns the string form of `field` on `node`, or `None` when absent.
    fn field(&self, node: &NodeId, field: &str) -> Option<String>;
}

/// A [`FieldSource`] with no fields; lookups push the canonical empty value.
pub struct NoFields;

impl FieldSource for NoFields {
    fn field(&self, _node: &NodeId, _field: &str) -> Option<String> {
        None
    }
}

/// Operators, one per token letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpCode {
    Add,
    Sub,
    Div,
    Mul,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Not,
    And,
    Or,
    Xor,
    In,
    TypeOf,
    StrCmp,
    IdCmp,
    CidCmp,
    GetStrField,
    GetIntField,
}

impl OpCode {
    fn from_letter(letter: u8) -> Result<Self, RpnError> {
        Ok(match letter {
            b'A' => OpCode::Add,
            b'B' => OpCode::Sub,
            b'C' => OpCode::Div,
            b'D' => OpCode::Mul,
            b'E' => OpCode::Rem,
            b'F' => OpCode::Eq,
            b'G' => OpCode::Ne,
            b'H' => OpCode::Lt,
            b'I' => OpCode::Gt,
            b'J' => OpCode::Le,
            b'K' => OpCode::Ge,
            b'L' => OpCode::Not,
            b'M' => OpCode::And,
            b'N' => OpCode::Or,
            b'O' => OpCode::Xor,
            b'a' => OpCode::In,
            b'b' => OpCode::TypeOf,
            b'c' => OpCode::StrCmp,
            b'd' => OpCode::IdCmp,
            b'e' => OpCode::CidCmp,
            b'f' => OpCode::GetStrField,
            b'g' => OpCode::GetIntField,
            _ => return Err(RpnError::IllegalOperator),
        })
    }
}

/// One compiled program token.
#[derive(Debug, Clone)]
enum Token {
    Op(OpCode),
    LitInt(i64),
    LitStr(Vec<u8>),
    RegNum(usize),
    RegAny(usize),
}

/// A compiled postfix program.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    tokens: Vec<Token>,
}

/// Compiles a whitespace-separated token stream.
///
/// Literal integers are `#<int>`, literal strings `"<chars>`, register
/// reads `@<digit>` (numeric view) or `$<digit>` (any view), and operators
/// single letters.
pub fn compile(input: &str) -> Result<CompiledExpr, RpnError> {
    let mut tokens = Vec::new();

    for word in input.split_ascii_whitespace() {
        let raw = word.as_bytes();
        let token = match raw[0] {
            b'@' => Token::RegNum(parse_reg_index(&raw[1..])?),
            b'$' => Token::RegAny(parse_reg_index(&raw[1..])?),
            b'#' => Token::LitInt(parse_int_prefix(&raw[1..]).ok_or(RpnError::Nan)?),
            b'"' => Token::LitStr(raw[1..].to_vec()),
            letter if letter.is_ascii_alphabetic() => {
                if raw.len() != 1 {
                    return Err(RpnError::IllegalOperand);
                }
                Token::Op(OpCode::from_letter(letter)?)
            }
            _ => return Err(RpnError::IllegalOperand),
        };
        tokens.push(token);
    }

    Ok(CompiledExpr { tokens })
}

fn parse_reg_index(rest: &[u8]) -> Result<usize, RpnError> {
    match rest {
        [digit @ b'0'..=b'9'] => Ok((digit - b'0') as usize),
        _ => Err(RpnError::IllegalOperand),
    }
}

/// Parses a leading optionally-signed decimal integer, saturating on
/// overflow. Returns `None` when no digits are present.
fn parse_int_prefix(bytes: &[u8]) -> Option<i64> {
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for &b in digits {
        if !b.is_ascii_digit() {
            break;
        }
        seen = true;
        value = value
            .saturating_mul(10)
            .saturating_add((b - b'0') as i64);
    }

    if !seen {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn parse_int_strict(s: &str) -> Option<i64> {
    s.parse::<i64>().ok()
}

/// A typed stack operand.
#[derive(Debug, Clone, Default)]
struct Operand {
    i: i64,
    bytes: SmallVec<[u8; SMALL_OPERAND_SIZE]>,
    nan: bool,
}

impl Operand {
    fn int(i: i64) -> Self {
        Operand {
            i,
            bytes: SmallVec::new(),
            nan: false,
        }
    }

    fn string(bytes: &[u8]) -> Self {
        Operand {
            i: 0,
            bytes: SmallVec::from_slice(bytes),
            nan: true,
        }
    }

    /// The canonical empty value pushed for missing fields.
    fn empty_value() -> Self {
        Operand {
            i: 0,
            bytes: SmallVec::from_slice(&[0, 0]),
            nan: false,
        }
    }

    fn bool(v: bool) -> Self {
        Operand::int(v as i64)
    }

    fn to_bool(&self) -> bool {
        (!self.bytes.is_empty() && self.bytes[0] != 0) || self.i != 0
    }

    fn type_prefix(&self) -> [u8; NODE_TYPE_SIZE] {
        let mut prefix = [0u8; NODE_TYPE_SIZE];
        for (slot, byte) in prefix.iter_mut().zip(self.bytes.iter()) {
            *slot = *byte;
        }
        prefix
    }
}

/// Evaluation context: registers plus the operand stack.
///
/// A context is not re-entrant; it is reset at the start of every
/// evaluation and the stack is cleared on any error.
#[derive(Debug)]
pub struct RpnCtx {
    reg: Vec<Option<Operand>>,
    stack: Vec<Operand>,
}

impl RpnCtx {
    /// Creates a context with `nr_reg` register slots.
    pub fn new(nr_reg: usize) -> Self {
        Self {
            reg: (0..nr_reg).map(|_| None).collect(),
            stack: Vec::new(),
        }
    }

    /// Returns the number of register slots.
    pub fn nr_reg(&self) -> usize {
        self.reg.len()
    }

    /// Sets register `i`, deriving the integer view from a leading-integer
    /// parse of the value. A value with no leading integer is flagged as
    /// not-a-number.
    pub fn set_reg(&mut self, i: usize, value: &[u8]) -> Result<(), RpnError> {
        let slot = self.reg.get_mut(i).ok_or(RpnError::Bounds)?;
        let parsed = parse_int_prefix(value);
        *slot = Some(Operand {
            i: parsed.unwrap_or(0),
            bytes: SmallVec::from_slice(value),
            nan: parsed.is_none(),
        });
        Ok(())
    }

    /// Clears register `i`.
    pub fn clear_reg(&mut self, i: usize) -> Result<(), RpnError> {
        let slot = self.reg.get_mut(i).ok_or(RpnError::Bounds)?;
        *slot = None;
        Ok(())
    }

    /// Evaluates `expr` and coerces the result to a boolean.
    pub fn bool(&mut self, fields: &dyn FieldSource, expr: &CompiledExpr) -> Result<bool, RpnError> {
        self.run(fields, expr).map(|res| res.to_bool())
    }

    /// Evaluates `expr` and returns the integer view of the result.
    pub fn integer(
        &mut self,
        fields: &dyn FieldSource,
        expr: &CompiledExpr,
    ) -> Result<i64, RpnError> {
        self.run(fields, expr).map(|res| res.i)
    }

    fn run(&mut self, fields: &dyn FieldSource, expr: &CompiledExpr) -> Result<Operand, RpnError> {
        self.stack.clear();
        let result = self.eval(fields, expr);
        if result.is_err() {
            self.stack.clear();
        }
        result
    }

    fn eval(&mut self, fields: &dyn FieldSource, expr: &CompiledExpr) -> Result<Operand, RpnError> {
        for token in &expr.tokens {
            match token {
                Token::Op(op) => self.apply(fields, *op)?,
                Token::LitInt(v) => self.push(Operand::int(*v))?,
                Token::LitStr(s) => self.push(Operand::string(s))?,
                Token::RegNum(i) => {
                    let operand = self.read_reg(*i)?;
                    if operand.nan {
                        return Err(RpnError::Nan);
                    }
                    self.push(operand)?;
                }
                Token::RegAny(i) => {
                    let operand = self.read_reg(*i)?;
                    self.push(operand)?;
                }
            }
        }

        if self.stack.len() != 1 {
            return Err(RpnError::BadStack);
        }
        Ok(self.stack.pop().expect("stack holds exactly one operand"))
    }

    fn read_reg(&self, i: usize) -> Result<Operand, RpnError> {
        let slot = self.reg.get(i).ok_or(RpnError::Bounds)?;
        slot.clone().ok_or(RpnError::NullPointer)
    }

    fn push(&mut self, operand: Operand) -> Result<(), RpnError> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(RpnError::BadStack);
        }
        self.stack.push(operand);
        Ok(())
    }

    fn pop(&mut self) -> Result<Operand, RpnError> {
        self.stack.pop().ok_or(RpnError::BadStack)
    }

    /// Pops the two operands of a binary operator in program order.
    fn pop2(&mut self) -> Result<(Operand, Operand), RpnError> {
        let second = self.pop()?;
        let first = self.pop()?;
        Ok((first, second))
    }

    fn apply(&mut self, fields: &dyn FieldSource, op: OpCode) -> Result<(), RpnError> {
        match op {
            OpCode::Add => {
                let (a, b) = self.pop2()?;
                self.push(Operand::int(a.i.wrapping_add(b.i)))
            }
            OpCode::Sub => {
                let (a, b) = self.pop2()?;
                self.push(Operand::int(a.i.wrapping_sub(b.i)))
            }
            OpCode::Div => {
                let (a, b) = self.pop2()?;
                if b.i == 0 {
                    return Err(RpnError::DivideByZero);
                }
                self.push(Operand::int(a.i.wrapping_div(b.i)))
            }
            OpCode::Mul => {
                let (a, b) = self.pop2()?;
                self.push(Operand::int(a.i.wrapping_mul(b.i)))
            }
            OpCode::Rem => {
                let (a, b) = self.pop2()?;
                if b.i == 0 {
                    return Err(RpnError::DivideByZero);
                }
                self.push(Operand::int(a.i.wrapping_rem(b.i)))
            }
            OpCode::Eq => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i == b.i))
            }
            OpCode::Ne => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i != b.i))
            }
            OpCode::Lt => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i < b.i))
            }
            OpCode::Gt => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i > b.i))
            }
            OpCode::Le => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i <= b.i))
            }
            OpCode::Ge => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.i >= b.i))
            }
            OpCode::Not => {
                let a = self.pop()?;
                self.push(Operand::bool(!a.to_bool()))
            }
            OpCode::And => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.to_bool() && b.to_bool()))
            }
            OpCode::Or => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.to_bool() || b.to_bool()))
            }
            OpCode::Xor => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.to_bool() ^ b.to_bool()))
            }
            OpCode::In => {
                let (_a, _b) = self.pop2()?;
                Err(RpnError::NotSupported)
            }
            OpCode::TypeOf => {
                let a = self.pop()?;
                if a.bytes.len() < NODE_ID_SIZE {
                    return Err(RpnError::Type);
                }
                let prefix = a.type_prefix();
                self.push(Operand::string(&prefix))
            }
            OpCode::StrCmp => {
                let (a, b) = self.pop2()?;
                self.push(Operand::bool(a.bytes == b.bytes))
            }
            OpCode::IdCmp => {
                let (a, b) = self.pop2()?;
                let size_ok = a.bytes.len() >= NODE_ID_SIZE && b.bytes.len() >= NODE_ID_SIZE;
                let equal =
                    size_ok && a.bytes[..NODE_ID_SIZE] == b.bytes[..NODE_ID_SIZE];
                self.push(Operand::bool(equal))
            }
            OpCode::CidCmp => {
                let a = self.pop()?;
                let current = self
                    .reg
                    .first()
                    .and_then(|slot| slot.as_ref())
                    .ok_or(RpnError::NullPointer)?;
                let equal = a.type_prefix() == current.type_prefix();
                self.push(Operand::bool(equal))
            }
            OpCode::GetStrField => {
                let field = self.pop()?;
                match self.lookup_field(fields, &field)? {
                    Some(value) => self.push(Operand::string(value.as_bytes())),
                    None => self.push(Operand::empty_value()),
                }
            }
            OpCode::GetIntField => {
                let field = self.pop()?;
                match self.lookup_field(fields, &field)? {
                    Some(value) => {
                        let parsed = parse_int_strict(&value).ok_or(RpnError::Nan)?;
                        self.push(Operand::int(parsed))
                    }
                    None => self.push(Operand::empty_value()),
                }
            }
        }
    }

    fn lookup_field(
        &self,
        fields: &dyn FieldSource,
        field: &Operand,
    ) -> Result<Option<String>, RpnError> {
        let current = self
            .reg
            .first()
            .and_then(|slot| slot.as_ref())
            .ok_or(RpnError::NullPointer)?;
        let node = NodeId::from_bytes(&current.bytes);
        let name = String::from_utf8_lossy(&field.bytes);
        Ok(fields.field(&node, &name))
    }
}
