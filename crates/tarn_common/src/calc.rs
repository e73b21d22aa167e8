//! Bit-accurate constant arithmetic over 4-state logic vectors.
//!
//! These are the pure functions the elaborator's constant folder calls.
//! Every operation takes two operands (unary operations ignore the second),
//! a signedness flag per operand, and a result width; it returns a
//! [`LogicVec`] of exactly that width. A negative result width means
//! "natural width" (derived from the operand widths).
//!
//! Undefined-value rules:
//! - Bitwise operations work bit-by-bit through the IEEE 1164 truth tables,
//!   so X and Z propagate per bit.
//! - Arithmetic operations produce an all-X result if any operand bit is
//!   undefined. Division and modulo by zero produce all-X.
//! - Comparisons produce a single X bit when an operand is undefined, except
//!   [`const_eqx`]/[`const_nex`] which compare the 4-valued bits literally.

use crate::logic::Logic;
use crate::logic_vec::LogicVec;

/// The shared signature of every kernel operation.
pub type ConstFn = fn(&LogicVec, &LogicVec, bool, bool, i32) -> LogicVec;

/// Resolves a requested result width: negative means `natural`.
fn out_width(result_width: i32, natural: u32) -> u32 {
    if result_width < 0 {
        natural
    } else {
        result_width as u32
    }
}

/// Extends both operands to a common width, each per its own signedness.
fn extend_pair(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    width: u32,
) -> (LogicVec, LogicVec) {
    (a.extended(width, signed_a), b.extended(width, signed_b))
}

/// Interprets a vector as an exact integer, if every bit is driven.
///
/// Vectors wider than 127 bits that are not pure sign/zero extension are
/// treated as undefined (the fold falls back to an all-X result).
fn to_i128(v: &LogicVec, signed: bool) -> Option<i128> {
    if !v.is_fully_def() {
        return None;
    }
    let negative = signed && v.width() > 0 && v.msb() == Logic::One;
    let mut result: i128 = if negative { -1 } else { 0 };
    for i in (0..v.width()).rev() {
        let bit = v.get(i) == Logic::One;
        if i >= 127 {
            if bit != negative {
                return None;
            }
            continue;
        }
        if bit {
            result |= 1 << i;
        } else {
            result &= !(1 << i);
        }
    }
    Some(result)
}

/// Builds a vector from an integer in two's complement at the given width.
fn from_i128(value: i128, width: u32) -> LogicVec {
    let mut v = LogicVec::new(width);
    for i in 0..width {
        let bit = if i < 127 {
            (value >> i) & 1 != 0
        } else {
            value < 0
        };
        if bit {
            v.set(i, Logic::One);
        }
    }
    v
}

/// Applies a bitwise binary operation at the result width.
fn bitwise(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
    op: fn(Logic, Logic) -> Logic,
) -> LogicVec {
    let width = out_width(result_width, a.width().max(b.width()));
    let (a, b) = extend_pair(a, b, signed_a, signed_b, width);
    let mut result = LogicVec::new(width);
    for i in 0..width {
        result.set(i, op(a.get(i), b.get(i)));
    }
    result
}

/// Applies an exact-integer arithmetic operation with all-X contamination.
///
/// Each operand widens to the result width under its own signedness before
/// both are interpreted under the mutual signedness.
fn arith(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
    op: fn(i128, i128) -> Option<i128>,
) -> LogicVec {
    let width = out_width(result_width, a.width().max(b.width()));
    let signed = signed_a && signed_b;
    let (ae, be) = extend_pair(a, b, signed_a, signed_b, width);
    match (to_i128(&ae, signed), to_i128(&be, signed)) {
        (Some(x), Some(y)) => match op(x, y) {
            Some(r) => from_i128(r, width),
            None => LogicVec::all_x(width),
        },
        _ => LogicVec::all_x(width),
    }
}

/// Bitwise NOT of `a` at the result width. `b` is ignored.
pub fn const_not(
    a: &LogicVec,
    _b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    let a = a.extended(width, signed_a);
    !&a
}

/// Bitwise AND of the operands at the result width.
pub fn const_and(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bitwise(a, b, signed_a, signed_b, result_width, |x, y| x & y)
}

/// Bitwise OR of the operands at the result width.
pub fn const_or(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bitwise(a, b, signed_a, signed_b, result_width, |x, y| x | y)
}

/// Bitwise XOR of the operands at the result width.
pub fn const_xor(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bitwise(a, b, signed_a, signed_b, result_width, |x, y| x ^ y)
}

/// Bitwise XNOR of the operands at the result width.
pub fn const_xnor(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bitwise(a, b, signed_a, signed_b, result_width, |x, y| !(x ^ y))
}

/// Addition at the result width.
pub fn const_add(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    arith(a, b, signed_a, signed_b, result_width, |x, y| {
        Some(x.wrapping_add(y))
    })
}

/// Subtraction at the result width.
pub fn const_sub(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    arith(a, b, signed_a, signed_b, result_width, |x, y| {
        Some(x.wrapping_sub(y))
    })
}

/// Multiplication at the result width.
pub fn const_mul(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    arith(a, b, signed_a, signed_b, result_width, |x, y| {
        Some(x.wrapping_mul(y))
    })
}

/// Truncating division at the result width. Division by zero yields all-X.
pub fn const_div(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    arith(a, b, signed_a, signed_b, result_width, |x, y| {
        if y == 0 {
            None
        } else {
            Some(x.wrapping_div(y))
        }
    })
}

/// Modulo (sign follows the dividend) at the result width. Modulo by zero
/// yields all-X.
pub fn const_mod(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    arith(a, b, signed_a, signed_b, result_width, |x, y| {
        if y == 0 {
            None
        } else {
            Some(x.wrapping_rem(y))
        }
    })
}

/// Exponentiation at the result width.
///
/// A negative exponent folds to 1, -1 (alternating), or 0 following the
/// integer power rules.
pub fn const_pow(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    match (to_i128(a, signed_a), to_i128(b, signed_b)) {
        (Some(base), Some(exp)) => {
            if exp < 0 {
                let r = match base {
                    1 => 1,
                    -1 => {
                        if exp % 2 == 0 {
                            1
                        } else {
                            -1
                        }
                    }
                    0 => return LogicVec::all_x(width),
                    _ => 0,
                };
                return from_i128(r, width);
            }
            let mut result: i128 = 1;
            let mut base = base;
            let mut exp = exp as u128;
            while exp > 0 {
                if exp & 1 != 0 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            from_i128(result, width)
        }
        _ => LogicVec::all_x(width),
    }
}

/// Unary plus: extends `a` to the result width.
pub fn const_pos(
    a: &LogicVec,
    _b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    if a.is_fully_def() {
        a.extended(width, signed_a)
    } else {
        LogicVec::all_x(width)
    }
}

/// Two's complement negation at the result width.
pub fn const_neg(
    a: &LogicVec,
    _b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    match to_i128(a, signed_a) {
        Some(x) => from_i128(x.wrapping_neg(), width),
        None => LogicVec::all_x(width),
    }
}

/// Shift helper: resolves the (unsigned) shift amount or returns `None`.
fn shift_amount(b: &LogicVec) -> Option<u32> {
    let n = to_i128(b, false)?;
    u32::try_from(n).ok()
}

/// Logical shift left at the result width.
pub fn const_shl(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    let Some(n) = shift_amount(b) else {
        return LogicVec::all_x(width);
    };
    let a = a.extended(width, signed_a);
    let mut result = LogicVec::new(width);
    for i in 0..width {
        if i >= n && a.get(i - n) != Logic::Zero {
            result.set(i, a.get(i - n));
        }
    }
    result
}

/// Logical shift right (zero fill) at the result width.
pub fn const_shr(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    let Some(n) = shift_amount(b) else {
        return LogicVec::all_x(width);
    };
    let a = a.extended(width, signed_a);
    let mut result = LogicVec::new(width);
    for i in 0..width {
        if i + n < width {
            result.set(i, a.get(i + n));
        }
    }
    result
}

/// Arithmetic shift left: identical to [`const_shl`].
pub fn const_sshl(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    const_shl(a, b, signed_a, signed_b, result_width)
}

/// Arithmetic shift right: fills with the sign bit when `a` is signed.
pub fn const_sshr(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = out_width(result_width, a.width());
    let Some(n) = shift_amount(b) else {
        return LogicVec::all_x(width);
    };
    let a = a.extended(width, signed_a);
    let fill = if signed_a && width > 0 {
        a.msb()
    } else {
        Logic::Zero
    };
    let mut result = LogicVec::new(width);
    for i in 0..width {
        let src = if i + n < width { a.get(i + n) } else { fill };
        result.set(i, src);
    }
    result
}

/// Extends a 1-bit outcome to the requested result width.
fn bool_result(value: Logic, result_width: i32) -> LogicVec {
    let mut v = LogicVec::new(1);
    v.set(0, value);
    v.extended(out_width(result_width, 1), false)
}

/// Compares the operands as exact integers under mutual signedness.
///
/// Returns `None` (meaning X) when either operand has undefined bits.
fn compare(a: &LogicVec, b: &LogicVec, signed_a: bool, signed_b: bool) -> Option<std::cmp::Ordering> {
    let signed = signed_a && signed_b;
    let width = a.width().max(b.width());
    let x = to_i128(&a.extended(width, signed_a), signed)?;
    let y = to_i128(&b.extended(width, signed_b), signed)?;
    Some(x.cmp(&y))
}

/// Less-than comparison; 1-bit result, X on undefined operands.
pub fn const_lt(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = match compare(a, b, signed_a, signed_b) {
        Some(ord) => Logic::from_bool(ord.is_lt()),
        None => Logic::X,
    };
    bool_result(out, result_width)
}

/// Less-or-equal comparison; 1-bit result, X on undefined operands.
pub fn const_le(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = match compare(a, b, signed_a, signed_b) {
        Some(ord) => Logic::from_bool(ord.is_le()),
        None => Logic::X,
    };
    bool_result(out, result_width)
}

/// Greater-or-equal comparison; 1-bit result, X on undefined operands.
pub fn const_ge(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = match compare(a, b, signed_a, signed_b) {
        Some(ord) => Logic::from_bool(ord.is_ge()),
        None => Logic::X,
    };
    bool_result(out, result_width)
}

/// Greater-than comparison; 1-bit result, X on undefined operands.
pub fn const_gt(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = match compare(a, b, signed_a, signed_b) {
        Some(ord) => Logic::from_bool(ord.is_gt()),
        None => Logic::X,
    };
    bool_result(out, result_width)
}

/// Logical equality.
///
/// A mismatch between two driven bits makes the result 0 even when other
/// bits are undefined; otherwise any undefined bit makes the result X.
pub fn const_eq(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = a.width().max(b.width());
    let (a, b) = extend_pair(a, b, signed_a, signed_b, width);
    let mut saw_undef = false;
    for i in 0..width {
        let (x, y) = (a.get(i), b.get(i));
        if x.is_defined() && y.is_defined() {
            if x != y {
                return bool_result(Logic::Zero, result_width);
            }
        } else {
            saw_undef = true;
        }
    }
    let out = if saw_undef { Logic::X } else { Logic::One };
    bool_result(out, result_width)
}

/// Logical inequality: the negation of [`const_eq`].
pub fn const_ne(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let eq = const_eq(a, b, signed_a, signed_b, 1);
    bool_result(!eq.get(0), result_width)
}

/// Case equality: literal comparison of the 4-valued bits.
pub fn const_eqx(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let width = a.width().max(b.width());
    let (a, b) = extend_pair(a, b, signed_a, signed_b, width);
    let equal = (0..width).all(|i| a.get(i) == b.get(i));
    bool_result(Logic::from_bool(equal), result_width)
}

/// Case inequality: the negation of [`const_eqx`].
pub fn const_nex(
    a: &LogicVec,
    b: &LogicVec,
    signed_a: bool,
    signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let eqx = const_eqx(a, b, signed_a, signed_b, 1);
    bool_result(!eqx.get(0), result_width)
}

/// Collapses a vector to its boolean truth value: 1 if any bit is 1, X if
/// no bit is 1 but some are undefined, else 0.
fn truthiness(v: &LogicVec) -> Logic {
    if v.any_one() {
        Logic::One
    } else if v.any_undef() {
        Logic::X
    } else {
        Logic::Zero
    }
}

/// Logical AND of the operands' truth values.
pub fn const_logic_and(
    a: &LogicVec,
    b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bool_result(truthiness(a) & truthiness(b), result_width)
}

/// Logical OR of the operands' truth values.
pub fn const_logic_or(
    a: &LogicVec,
    b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bool_result(truthiness(a) | truthiness(b), result_width)
}

/// Logical NOT of the operand's truth value. `b` is ignored.
pub fn const_logic_not(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bool_result(!truthiness(a), result_width)
}

/// AND-reduction of all bits. `b` is ignored.
pub fn const_reduce_and(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = a.bits().fold(Logic::One, |acc, b| acc & b);
    bool_result(out, result_width)
}

/// OR-reduction of all bits. `b` is ignored.
pub fn const_reduce_or(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = a.bits().fold(Logic::Zero, |acc, b| acc | b);
    bool_result(out, result_width)
}

/// XOR-reduction of all bits. `b` is ignored.
pub fn const_reduce_xor(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = a.bits().fold(Logic::Zero, |acc, b| acc ^ b);
    bool_result(out, result_width)
}

/// XNOR-reduction of all bits. `b` is ignored.
pub fn const_reduce_xnor(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    let out = !a.bits().fold(Logic::Zero, |acc, b| acc ^ b);
    bool_result(out, result_width)
}

/// Boolean reduction: the operand's truth value. `b` is ignored.
pub fn const_reduce_bool(
    a: &LogicVec,
    _b: &LogicVec,
    _signed_a: bool,
    _signed_b: bool,
    result_width: i32,
) -> LogicVec {
    bool_result(truthiness(a), result_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(s: &str) -> LogicVec {
        LogicVec::from_binary_str(s).unwrap()
    }

    fn int(v: i64, w: u32) -> LogicVec {
        LogicVec::from_i64(v, w)
    }

    #[test]
    fn bitwise_extends_operands() {
        let a = bv("1");
        let b = bv("0110");
        let r = const_and(&a, &b, false, false, 4);
        assert_eq!(format!("{r}"), "0000");
        let r = const_or(&a, &b, false, false, 4);
        assert_eq!(format!("{r}"), "0111");
    }

    #[test]
    fn bitwise_x_propagates_per_bit() {
        let a = bv("1X10");
        let b = bv("1101");
        let r = const_and(&a, &b, false, false, 4);
        assert_eq!(format!("{r}"), "1X00");
    }

    #[test]
    fn not_inverts_at_width() {
        let r = const_not(&bv("10"), &bv(""), false, false, 4);
        assert_eq!(format!("{r}"), "1101");
    }

    #[test]
    fn add_basic() {
        let r = const_add(&int(3, 8), &int(4, 8), false, false, 8);
        assert_eq!(r.as_i64(false), Some(7));
    }

    #[test]
    fn add_signed_extension() {
        // (-1) + 1 at 8 bits from 4-bit operands
        let r = const_add(&int(-1, 4), &int(1, 4), true, true, 8);
        assert_eq!(r.as_i64(true), Some(0));
    }

    #[test]
    fn add_undef_contaminates() {
        let r = const_add(&bv("1X"), &int(1, 2), false, false, 4);
        assert_eq!(format!("{r}"), "XXXX");
    }

    #[test]
    fn sub_wraps_at_width() {
        let r = const_sub(&int(0, 4), &int(1, 4), false, false, 4);
        assert_eq!(format!("{r}"), "1111");
    }

    #[test]
    fn mul_truncates() {
        let r = const_mul(&int(3, 8), &int(2, 8), false, false, 8);
        assert_eq!(r.as_i64(false), Some(6));
        let r = const_mul(&int(255, 8), &int(2, 8), false, false, 8);
        assert_eq!(r.as_i64(false), Some(254));
    }

    #[test]
    fn div_by_zero_is_all_x() {
        let r = const_div(&int(10, 8), &int(0, 8), false, false, 8);
        assert_eq!(format!("{r}"), "XXXXXXXX");
        let r = const_mod(&int(10, 8), &int(0, 8), false, false, 8);
        assert!(r.any_undef());
    }

    #[test]
    fn div_signed_truncates_toward_zero() {
        let r = const_div(&int(-7, 8), &int(2, 8), true, true, 8);
        assert_eq!(r.as_i64(true), Some(-3));
        let r = const_mod(&int(-7, 8), &int(2, 8), true, true, 8);
        assert_eq!(r.as_i64(true), Some(-1));
    }

    #[test]
    fn pow_cases() {
        let r = const_pow(&int(2, 8), &int(10, 8), false, false, 16);
        assert_eq!(r.as_i64(false), Some(1024));
        // negative exponent
        let r = const_pow(&int(2, 8), &int(-1, 8), true, true, 8);
        assert_eq!(r.as_i64(false), Some(0));
        let r = const_pow(&int(-1, 8), &int(-3, 8), true, true, 8);
        assert_eq!(r.as_i64(true), Some(-1));
    }

    #[test]
    fn neg_two_complement() {
        let r = const_neg(&int(5, 8), &bv(""), true, false, 8);
        assert_eq!(r.as_i64(true), Some(-5));
    }

    #[test]
    fn shifts() {
        let r = const_shl(&int(1, 8), &int(3, 8), false, false, 8);
        assert_eq!(r.as_i64(false), Some(8));
        let r = const_shr(&int(8, 8), &int(3, 8), false, false, 8);
        assert_eq!(r.as_i64(false), Some(1));
        // arithmetic right shift keeps the sign
        let r = const_sshr(&int(-8, 8), &int(2, 8), true, false, 8);
        assert_eq!(r.as_i64(true), Some(-2));
        // undefined shift amount
        let r = const_shl(&int(1, 4), &bv("X"), false, false, 4);
        assert_eq!(format!("{r}"), "XXXX");
    }

    #[test]
    fn comparisons_signed_vs_unsigned() {
        // 4'b1111 is -1 signed, 15 unsigned
        let a = int(-1, 4);
        let b = int(1, 4);
        assert!(const_lt(&a, &b, true, true, 1).any_one());
        assert!(!const_lt(&a, &b, false, false, 1).any_one());
        assert!(const_gt(&a, &b, false, false, 1).any_one());
        assert!(const_ge(&b, &b, false, false, 1).any_one());
        assert!(const_le(&b, &b, true, true, 1).any_one());
    }

    #[test]
    fn comparison_undef_yields_x() {
        let r = const_lt(&bv("1X"), &bv("10"), false, false, 1);
        assert_eq!(r.get(0), Logic::X);
    }

    #[test]
    fn eq_with_definite_mismatch_is_zero() {
        // an undefined bit elsewhere cannot hide the driven mismatch
        let r = const_eq(&bv("X1"), &bv("X0"), false, false, 1);
        assert_eq!(r.get(0), Logic::Zero);
        let r = const_eq(&bv("X1"), &bv("01"), false, false, 1);
        assert_eq!(r.get(0), Logic::X);
        let r = const_eq(&bv("11"), &bv("11"), false, false, 1);
        assert_eq!(r.get(0), Logic::One);
    }

    #[test]
    fn ne_negates_eq() {
        assert_eq!(const_ne(&bv("10"), &bv("11"), false, false, 1).get(0), Logic::One);
        assert_eq!(const_ne(&bv("11"), &bv("11"), false, false, 1).get(0), Logic::Zero);
        assert_eq!(const_ne(&bv("1X"), &bv("11"), false, false, 1).get(0), Logic::X);
    }

    #[test]
    fn eqx_compares_literally() {
        assert!(const_eqx(&bv("1X"), &bv("1X"), false, false, 1).any_one());
        assert!(!const_eqx(&bv("1X"), &bv("1Z"), false, false, 1).any_one());
        assert!(const_nex(&bv("1X"), &bv("10"), false, false, 1).any_one());
    }

    #[test]
    fn logic_ops() {
        assert_eq!(
            const_logic_and(&bv("10"), &bv("01"), false, false, 1).get(0),
            Logic::One
        );
        assert_eq!(
            const_logic_and(&bv("00"), &bv("X"), false, false, 1).get(0),
            Logic::Zero
        );
        assert_eq!(
            const_logic_or(&bv("00"), &bv("X"), false, false, 1).get(0),
            Logic::X
        );
        assert_eq!(const_logic_not(&bv("00"), &bv(""), false, false, 1).get(0), Logic::One);
        assert_eq!(const_logic_not(&bv("0X"), &bv(""), false, false, 1).get(0), Logic::X);
    }

    #[test]
    fn reductions() {
        assert_eq!(const_reduce_and(&bv("111"), &bv(""), false, false, 1).get(0), Logic::One);
        assert_eq!(const_reduce_and(&bv("1X1"), &bv(""), false, false, 1).get(0), Logic::X);
        assert_eq!(const_reduce_and(&bv("101"), &bv(""), false, false, 1).get(0), Logic::Zero);
        assert_eq!(const_reduce_or(&bv("000"), &bv(""), false, false, 1).get(0), Logic::Zero);
        assert_eq!(const_reduce_or(&bv("0X0"), &bv(""), false, false, 1).get(0), Logic::X);
        assert_eq!(const_reduce_xor(&bv("110"), &bv(""), false, false, 1).get(0), Logic::Zero);
        assert_eq!(const_reduce_xor(&bv("100"), &bv(""), false, false, 1).get(0), Logic::One);
        assert_eq!(const_reduce_xnor(&bv("100"), &bv(""), false, false, 1).get(0), Logic::Zero);
        assert_eq!(const_reduce_bool(&bv("0010"), &bv(""), false, false, 1).get(0), Logic::One);
    }

    #[test]
    fn natural_width_from_operands() {
        let r = const_add(&int(1, 4), &int(1, 8), false, false, -1);
        assert_eq!(r.width(), 8);
        assert_eq!(r.as_i64(false), Some(2));
    }
}
