//! Arithmetic, comparison, and stringification operators.
//!
//! Implements the type-promotion rules from the executioner's operator
//! families: int/float promotion, string concatenation (stringifying
//! whichever operand isn't already a string), and the list arithmetic that
//! delegates to the list table (union, difference, add-flag, remove-flag,
//! shift).

use crate::bytecode::{BinOp, CmpOp};
use crate::error::{Error, Result};
use crate::list_table::{ListFlag, ListTable};
use crate::string_table::StringTable;
use crate::value::{StringRef, Value};

/// Render a value the way the output stream and string concatenation both
/// need it: ints as decimal, floats with trailing zeros trimmed, bools as
/// `"true"`/`"false"`, lists as their ascending comma-joined flag names.
pub fn stringify(value: &Value, lists: &ListTable, strings: &StringTable) -> String {
    match value {
        Value::None | Value::Null => String::new(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Str(StringRef::Interned(id)) => strings.get(*id).unwrap_or("").to_string(),
        Value::Str(StringRef::Constant(_)) => String::new(),
        Value::List(handle) => lists.stringify(*handle),
        Value::ListFlag { list_id, flag } => lists
            .flag_name(ListFlag {
                list_id: *list_id,
                flag: *flag,
            })
            .unwrap_or("")
            .to_string(),
        Value::Newline => "\n".to_string(),
        _ => String::new(),
    }
}

/// Shortest round-trip decimal with trailing zeros (but not the decimal
/// point itself) trimmed, matching the standard-formatter rule from the
/// arithmetic family's string-concatenation behaviour.
fn format_float(f: f32) -> String {
    let s = format!("{f}");
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

fn resolve_str<'a>(value: &Value, strings: &'a StringTable) -> Option<&'a str> {
    match value {
        Value::Str(StringRef::Interned(id)) => strings.get(*id),
        _ => None,
    }
}

/// Apply a binary operator to two values, including the type-promotion
/// rules: int/float mixes promote to float, a string operand coerces its
/// partner via [`stringify`] and concatenates, and list operands delegate
/// to the list table.
pub fn apply_binop(
    op: &BinOp,
    left: &Value,
    right: &Value,
    lists: &mut ListTable,
    strings: &mut StringTable,
) -> Result<Value> {
    match op {
        BinOp::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                let a = stringify(left, lists, strings);
                let b = stringify(right, lists, strings);
                let id = strings.create(format!("{a}{b}"))?;
                return Ok(Value::Str(StringRef::Interned(id)));
            }
            match (left, right) {
                (Value::List(a), Value::List(b)) => Ok(Value::List(lists.union(*a, *b)?)),
                (Value::List(a), Value::ListFlag { list_id, flag }) => {
                    Ok(Value::List(lists.add(*a, ListFlag { list_id: *list_id, flag: *flag })?))
                }
                _ => numeric_binop(left, right, "+", |a, b| a + b, |a, b| a + b),
            }
        }
        BinOp::Sub => match (left, right) {
            (Value::List(a), Value::List(b)) => Ok(Value::List(lists.difference(*a, *b)?)),
            (Value::List(a), Value::ListFlag { list_id, flag }) => {
                Ok(Value::List(lists.sub(*a, ListFlag { list_id: *list_id, flag: *flag })?))
            }
            _ => numeric_binop(left, right, "-", |a, b| a - b, |a, b| a - b),
        },
        BinOp::Mult => numeric_binop(left, right, "*", |a, b| a * b, |a, b| a * b),
        BinOp::Div => {
            let a = numeric_operand(left, "/")?;
            let b = numeric_operand(right, "/")?;
            if b == 0.0 {
                return Err(Error::DivisionByZero);
            }
            if let (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) = (left, right)
            {
                Ok(Value::Int((a / b).trunc() as i32))
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinOp::Mod => {
            let a = numeric_operand(left, "%")?;
            let b = numeric_operand(right, "%")?;
            if b == 0.0 {
                return Err(Error::DivisionByZero);
            }
            if let (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) = (left, right)
            {
                Ok(Value::Int((a % b).trunc() as i32))
            } else {
                Ok(Value::Float(a % b))
            }
        }
        BinOp::ListShift => match (left, right) {
            (Value::List(a), Value::Int(n)) => {
                let mut handle = *a;
                if *n >= 0 {
                    for flag in list_successors(lists, handle, *n) {
                        handle = lists.add(handle, flag)?;
                    }
                }
                Ok(Value::List(handle))
            }
            _ => Err(type_error("*", left, right)),
        },
        BinOp::ListUnion => match (left, right) {
            (Value::List(a), Value::List(b)) => Ok(Value::List(lists.union(*a, *b)?)),
            _ => Err(type_error("+", left, right)),
        },
        BinOp::ListDifference => match (left, right) {
            (Value::List(a), Value::List(b)) => Ok(Value::List(lists.difference(*a, *b)?)),
            _ => Err(type_error("-", left, right)),
        },
    }
}

/// Returns the flags immediately following the current maximum element, up
/// to `n` of them, within the same origin list — the list-table side of a
/// `list * int` shift.
fn list_successors(lists: &ListTable, handle: crate::list_table::ListHandle, n: i32) -> Vec<ListFlag> {
    let Some(max) = lists.max(handle) else {
        return Vec::new();
    };
    (1..=n)
        .map(|i| ListFlag {
            list_id: max.list_id,
            flag: max.flag + i as i16,
        })
        .collect()
}

/// Apply a comparison/boolean operator. `Has`/`HasNot` test list/flag
/// membership; `And`/`Or` operate on truthiness; the rest compare by value,
/// with list comparisons delegating to [`ListTable::eq`]/[`ListTable::cmp`].
pub fn apply_cmpop(
    op: &CmpOp,
    left: &Value,
    right: &Value,
    lists: &ListTable,
    strings: &StringTable,
) -> Result<bool> {
    match op {
        CmpOp::Eq => Ok(values_equal(left, right, lists, strings)),
        CmpOp::NotEq => Ok(!values_equal(left, right, lists, strings)),
        CmpOp::And => Ok(left.is_truthy() && right.is_truthy()),
        CmpOp::Or => Ok(left.is_truthy() || right.is_truthy()),
        CmpOp::Has => list_membership(left, right, lists),
        CmpOp::HasNot => list_membership(left, right, lists).map(|b| !b),
        CmpOp::Gt | CmpOp::GtE | CmpOp::Lt | CmpOp::LtE => {
            if let (Value::List(a), Value::List(b)) = (left, right) {
                let ord = lists.cmp(*a, *b);
                return Ok(match op {
                    CmpOp::Gt => ord == std::cmp::Ordering::Greater,
                    CmpOp::GtE => ord != std::cmp::Ordering::Less,
                    CmpOp::Lt => ord == std::cmp::Ordering::Less,
                    CmpOp::LtE => ord != std::cmp::Ordering::Greater,
                    _ => unreachable!(),
                });
            }
            let a = numeric_operand(left, "comparison")?;
            let b = numeric_operand(right, "comparison")?;
            Ok(match op {
                CmpOp::Gt => a > b,
                CmpOp::GtE => a >= b,
                CmpOp::Lt => a < b,
                CmpOp::LtE => a <= b,
                _ => unreachable!(),
            })
        }
    }
}

fn list_membership(container: &Value, needle: &Value, lists: &ListTable) -> Result<bool> {
    match (container, needle) {
        (Value::List(l), Value::ListFlag { list_id, flag }) => Ok(lists.has(
            *l,
            ListFlag {
                list_id: *list_id,
                flag: *flag,
            },
        )),
        (Value::List(a), Value::List(b)) => {
            Ok(lists.flags(*b).into_iter().all(|f| lists.has(*a, f)))
        }
        _ => Err(type_error("has", container, needle)),
    }
}

/// Equality with Ink's numeric-encoding rule: an `int` and a `float` of the
/// same mathematical value compare equal, and an unset variable (`None`)
/// is equal only to `None`.
fn values_equal(left: &Value, right: &Value, lists: &ListTable, strings: &StringTable) -> bool {
    match (left, right) {
        (Value::None, Value::None) | (Value::Null, Value::Null) => true,
        (Value::None, _) | (_, Value::None) => false,
        (Value::List(a), Value::List(b)) => lists.eq(*a, *b),
        (Value::Str(_), Value::Str(_)) => resolve_str(left, strings) == resolve_str(right, strings),
        _ if left.is_numeric() && right.is_numeric() => left.as_float() == right.as_float(),
        _ => left == right,
    }
}

fn numeric_operand(value: &Value, op: &'static str) -> Result<f32> {
    value.as_float().ok_or_else(|| Error::Type {
        op,
        left: value.type_name(),
        right: "number",
    })
}

fn numeric_binop(
    left: &Value,
    right: &Value,
    op: &'static str,
    int_op: impl Fn(i32, i32) -> i32,
    float_op: impl Fn(f32, f32) -> f32,
) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let a = numeric_operand(left, op)?;
            let b = numeric_operand(right, op)?;
            Ok(Value::Float(float_op(a, b)))
        }
        _ if left.is_numeric() && right.is_numeric() => {
            let a = left.as_int().unwrap();
            let b = right.as_int().unwrap();
            Ok(Value::Int(int_op(a, b)))
        }
        _ => Err(type_error(op, left, right)),
    }
}

fn type_error(op: &'static str, left: &Value, right: &Value) -> Error {
    Error::Type {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_string_concat_both_directions_match() {
        let mut lists = ListTable::new();
        let mut strings = StringTable::new();
        let a = apply_binop(
            &BinOp::Add,
            &Value::Int(4),
            &Value::Str(StringRef::Interned(strings.create("5hello".into()).unwrap())),
            &mut lists,
            &mut strings,
        )
        .unwrap();
        let b = apply_binop(
            &BinOp::Add,
            &Value::Int(45),
            &Value::Str(StringRef::Interned(strings.create("hello".into()).unwrap())),
            &mut lists,
            &mut strings,
        )
        .unwrap();
        assert!(apply_cmpop(&CmpOp::Eq, &a, &b, &lists, &strings).unwrap());
        assert_eq!(stringify(&a, &lists, &strings), "45hello");
    }

    #[test]
    fn repeated_accumulation_matches_direct_literal() {
        let mut lists = ListTable::new();
        let mut strings = StringTable::new();
        let mut acc = Value::Str(StringRef::Interned(strings.create("4".into()).unwrap()));
        for _ in 0..31 {
            acc = apply_binop(&BinOp::Add, &acc, &Value::Int(4), &mut lists, &mut strings).unwrap();
        }
        let literal = Value::Str(StringRef::Interned(strings.create("4".repeat(32)).unwrap()));
        assert!(apply_cmpop(&CmpOp::Eq, &acc, &literal, &lists, &strings).unwrap());
    }

    #[test]
    fn float_and_int_promote_and_divide() {
        let mut lists = ListTable::new();
        let mut strings = StringTable::new();
        let sum = apply_binop(&BinOp::Add, &Value::Float(5.0), &Value::Int(8), &mut lists, &mut strings).unwrap();
        assert_eq!(sum, Value::Float(13.0));

        let quotient = apply_binop(&BinOp::Div, &Value::Float(5.0), &Value::Int(8), &mut lists, &mut strings).unwrap();
        assert_eq!(quotient, Value::Float(0.625));
    }

    #[test]
    fn int_equals_float_of_same_value() {
        let lists = ListTable::new();
        let strings = StringTable::new();
        assert!(apply_cmpop(&CmpOp::Eq, &Value::Int(4), &Value::Float(4.0), &lists, &strings).unwrap());
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut lists = ListTable::new();
        let mut strings = StringTable::new();
        let err = apply_binop(&BinOp::Div, &Value::Int(1), &Value::Int(0), &mut lists, &mut strings).unwrap_err();
        assert_eq!(err, Error::DivisionByZero);
    }
}
