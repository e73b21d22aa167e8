//! Diagnostic codes and helper functions for elaboration errors and warnings.
//!
//! Error codes `E300`--`E330` cover fatal elaboration failures, grouped by
//! kind: `E30x` for non-constant expressions in constant contexts, `E31x`
//! for name-resolution failures, `E32x` for construct misuse, `E330` for
//! system-function arity. Warning codes `W300`--`W302` cover the non-fatal
//! rewrites the engine reports.

use tarn_diagnostics::{Category, Diagnostic, DiagnosticCode, Label};
use tarn_source::Span;

/// A fatal elaboration failure.
///
/// The diagnostic has already been emitted into the sink when this error is
/// constructed; the error value itself only aborts the elaboration of the
/// current module by propagating up the recursion.
#[derive(Debug, thiserror::Error)]
#[error("{}: {}", .diagnostic.code, .diagnostic.message)]
pub struct ElabError {
    /// The diagnostic that was reported for this failure.
    pub diagnostic: Diagnostic,
}

/// The result type of every fallible elaboration step.
pub type ElabResult<T> = Result<T, ElabError>;

/// Non-constant expression where a constant is required.
pub const E300: DiagnosticCode = DiagnosticCode::new(Category::Error, 300);
/// Non-constant width range on a parameter declaration.
pub const E301: DiagnosticCode = DiagnosticCode::new(Category::Error, 301);
/// Non-constant index in generate-scope prefix syntax.
pub const E302: DiagnosticCode = DiagnosticCode::new(Category::Error, 302);
/// Non-constant function call in a constant expression.
pub const E303: DiagnosticCode = DiagnosticCode::new(Category::Error, 303);
/// Function with constant-only constructs called with non-constant arguments.
pub const E304: DiagnosticCode = DiagnosticCode::new(Category::Error, 304);
/// Non-constant intermediate value in a constant function.
pub const E305: DiagnosticCode = DiagnosticCode::new(Category::Error, 305);
/// Constant function evaluation exceeded its step budget.
pub const E306: DiagnosticCode = DiagnosticCode::new(Category::Error, 306);
/// Unsupported language construct in a constant function.
pub const E307: DiagnosticCode = DiagnosticCode::new(Category::Error, 307);
/// Unsupported variable access in a constant function.
pub const E308: DiagnosticCode = DiagnosticCode::new(Category::Error, 308);
/// Unsupported expression on a dynamic range select.
pub const E309: DiagnosticCode = DiagnosticCode::new(Category::Error, 309);

/// Defparam path does not contain a dot separator.
pub const E310: DiagnosticCode = DiagnosticCode::new(Category::Error, 310);
/// Defparam refers to an unknown cell.
pub const E311: DiagnosticCode = DiagnosticCode::new(Category::Error, 311);
/// Function or task name cannot be resolved.
pub const E312: DiagnosticCode = DiagnosticCode::new(Category::Error, 312);
/// Loop variable is not a genvar (generate loop) or register (for loop).
pub const E313: DiagnosticCode = DiagnosticCode::new(Category::Error, 313);
/// Init and step of a for loop assign different variables.
pub const E314: DiagnosticCode = DiagnosticCode::new(Category::Error, 314);
/// Loop init or step is not a blocking assignment.
pub const E315: DiagnosticCode = DiagnosticCode::new(Category::Error, 315);

/// `while` loop outside a constant function.
pub const E320: DiagnosticCode = DiagnosticCode::new(Category::Error, 320);
/// `repeat` loop outside a constant function.
pub const E321: DiagnosticCode = DiagnosticCode::new(Category::Error, 321);
/// Invalid bit-select on a memory access.
pub const E322: DiagnosticCode = DiagnosticCode::new(Category::Error, 322);
/// Incompatible re-declaration of a wire.
pub const E323: DiagnosticCode = DiagnosticCode::new(Category::Error, 323);
/// Arrays of gate primitives are not supported.
pub const E324: DiagnosticCode = DiagnosticCode::new(Category::Error, 324);
/// Wrong number of connections on a gate primitive.
pub const E325: DiagnosticCode = DiagnosticCode::new(Category::Error, 325);
/// Unsupported assignment target in a constant function.
pub const E326: DiagnosticCode = DiagnosticCode::new(Category::Error, 326);
/// Width and sign of an expression cannot be determined.
pub const E327: DiagnosticCode = DiagnosticCode::new(Category::Error, 327);

/// Wrong number of arguments to a system function.
pub const E330: DiagnosticCode = DiagnosticCode::new(Category::Error, 330);

/// Memory demoted to a list of registers.
pub const W300: DiagnosticCode = DiagnosticCode::new(Category::Warning, 300);
/// Real value converted to bits for a sized parameter.
pub const W301: DiagnosticCode = DiagnosticCode::new(Category::Warning, 301);
/// Blocking assignment to a memory treated as non-blocking.
pub const W302: DiagnosticCode = DiagnosticCode::new(Category::Warning, 302);

/// Creates a diagnostic for a non-constant expression in a constant context.
pub fn error_not_constant(what: &str, span: Span) -> Diagnostic {
    Diagnostic::error(E300, format!("{what} is not constant"), span)
}

/// Creates a diagnostic for a non-constant parameter range.
pub fn error_param_range_not_constant(span: Span) -> Diagnostic {
    Diagnostic::error(
        E301,
        "non-constant width range on parameter declaration",
        span,
    )
}

/// Creates a diagnostic for a non-constant generate-prefix index.
pub fn error_prefix_index_not_constant(span: Span) -> Diagnostic {
    Diagnostic::error(E302, "index in generate scope prefix is not constant", span)
}

/// Creates a diagnostic for a non-constant function call in a constant
/// expression.
pub fn error_fcall_not_constant(name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E303,
        format!("non-constant call of `{name}` in constant expression"),
        span,
    )
}

/// Creates a diagnostic for a constant-only function with non-constant
/// arguments.
pub fn error_const_args_required(name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E304,
        format!("function `{name}` can only be called with constant arguments"),
        span,
    )
    .with_note("the function body contains while/repeat loops")
}

/// Creates a diagnostic for a non-constant intermediate in a constant
/// function.
pub fn error_const_func_not_constant(span: Span, call_span: Span) -> Diagnostic {
    Diagnostic::error(E305, "non-constant expression in constant function", span)
        .with_label(Label::secondary(call_span, "called from here"))
}

/// Creates a diagnostic for a constant function exceeding its step budget.
pub fn error_const_func_budget(name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E306,
        format!("constant function `{name}` exceeded the evaluation step budget"),
        span,
    )
    .with_note("the function may contain a non-terminating loop")
}

/// Creates a diagnostic for an unsupported statement in a constant function.
pub fn error_const_func_unsupported(span: Span, call_span: Span) -> Diagnostic {
    Diagnostic::error(
        E307,
        "unsupported language construct in constant function",
        span,
    )
    .with_label(Label::secondary(call_span, "called from here"))
}

/// Creates a diagnostic for an unsupported variable access in a constant
/// function.
pub fn error_const_func_access(what: &str, span: Span, call_span: Span) -> Diagnostic {
    Diagnostic::error(E308, format!("{what} in constant function"), span)
        .with_label(Label::secondary(call_span, "called from here"))
}

/// Creates a diagnostic for an unsupported dynamic range select.
pub fn error_dynamic_range_select(name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E309,
        format!("unsupported expression on dynamic range select on signal `{name}`"),
        span,
    )
}

/// Creates a diagnostic for a defparam path without a dot.
pub fn error_defparam_no_dot(path: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E310,
        format!("defparam `{path}` does not contain a cell/parameter separator"),
        span,
    )
}

/// Creates a diagnostic for a defparam naming an unknown cell.
pub fn error_defparam_unknown_cell(cell: &str, param: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E311,
        format!("cannot find cell for defparam `{cell}.{param}`"),
        span,
    )
}

/// Creates a diagnostic for an unresolved function or task name.
pub fn error_unknown_callable(what: &str, name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(E312, format!("cannot resolve {what} name `{name}`"), span)
}

/// Creates a diagnostic for a loop variable of the wrong kind.
pub fn error_bad_loop_variable(expected: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E313,
        format!("left-hand side of loop init/step is not a {expected}"),
        span,
    )
}

/// Creates a diagnostic for mismatched loop init/step targets.
pub fn error_loop_lhs_mismatch(span: Span) -> Diagnostic {
    Diagnostic::error(
        E314,
        "init and step of the loop assign different variables",
        span,
    )
}

/// Creates a diagnostic for a malformed loop header.
pub fn error_loop_header(what: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E315,
        format!("unsupported {what} expression of loop header"),
        span,
    )
}

/// Creates a diagnostic for a `while` loop outside a constant function.
pub fn error_while_outside_const_func(span: Span) -> Diagnostic {
    Diagnostic::error(
        E320,
        "while loops are only allowed in constant functions",
        span,
    )
}

/// Creates a diagnostic for a `repeat` loop outside a constant function.
pub fn error_repeat_outside_const_func(span: Span) -> Diagnostic {
    Diagnostic::error(
        E321,
        "repeat loops are only allowed in constant functions",
        span,
    )
}

/// Creates a diagnostic for an invalid bit-select on a memory access.
pub fn error_memory_bit_select(span: Span) -> Diagnostic {
    Diagnostic::error(E322, "invalid bit-select on memory access", span)
}

/// Creates a diagnostic for an incompatible wire re-declaration.
pub fn error_wire_redeclared(name: &str, span: Span, prev_span: Span) -> Diagnostic {
    Diagnostic::error(
        E323,
        format!("incompatible re-declaration of wire `{name}`"),
        span,
    )
    .with_label(Label::secondary(prev_span, "previously declared here"))
}

/// Creates a diagnostic for an array of gate primitives.
pub fn error_primitive_array(span: Span) -> Diagnostic {
    Diagnostic::error(E324, "arrays of gate primitives are not supported", span)
}

/// Creates a diagnostic for a bad primitive connection count.
pub fn error_primitive_args(name: &str, span: Span) -> Diagnostic {
    Diagnostic::error(
        E325,
        format!("invalid number of connections for primitive `{name}`"),
        span,
    )
}

/// Creates a diagnostic for an unsupported constant-function assignment
/// target.
pub fn error_const_func_lhs(what: &str, span: Span, call_span: Span) -> Diagnostic {
    Diagnostic::error(
        E326,
        format!("{what} in constant function assignment"),
        span,
    )
    .with_label(Label::secondary(call_span, "called from here"))
}

/// Creates a diagnostic for an expression whose width cannot be inferred.
pub fn error_cannot_detect_width(span: Span) -> Diagnostic {
    Diagnostic::error(
        E327,
        "cannot determine width and sign of expression",
        span,
    )
}

/// Creates a diagnostic for a system-function arity mismatch.
pub fn error_system_function_arity(name: &str, expected: usize, got: usize, span: Span) -> Diagnostic {
    Diagnostic::error(
        E330,
        format!("system function {name} got {got} arguments, expected {expected}"),
        span,
    )
}

/// Creates the warning for a memory demoted to registers.
pub fn warn_memory_demoted(name: &str, span: Span) -> Diagnostic {
    Diagnostic::warning(
        W300,
        format!("replacing memory `{name}` with a list of registers"),
        span,
    )
}

/// Creates the warning for a real-to-bits parameter conversion.
pub fn warn_real_to_bits(value: f64, span: Span) -> Diagnostic {
    Diagnostic::warning(
        W301,
        format!("converting real value {value:e} to binary for sized parameter"),
        span,
    )
}

/// Creates the warning for a blocking memory write.
pub fn warn_blocking_memory_write(span: Span) -> Diagnostic {
    Diagnostic::warning(
        W302,
        "blocking assignment to memory is handled like a non-blocking assignment",
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_diagnostics::Severity;

    #[test]
    fn error_code_formats() {
        assert_eq!(format!("{E300}"), "E300");
        assert_eq!(format!("{E323}"), "E323");
        assert_eq!(format!("{W302}"), "W302");
    }

    #[test]
    fn not_constant_diagnostic() {
        let d = error_not_constant("condition for generate if", Span::DUMMY);
        assert_eq!(d.code, E300);
        assert!(d.message.contains("generate if"));
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn wire_redeclared_has_secondary_label() {
        let d = error_wire_redeclared("foobar", Span::DUMMY, Span::DUMMY);
        assert_eq!(d.code, E323);
        assert_eq!(d.labels.len(), 1);
    }

    #[test]
    fn arity_diagnostic() {
        let d = error_system_function_arity("$clog2", 1, 3, Span::DUMMY);
        assert_eq!(d.code, E330);
        assert!(d.message.contains("expected 1"));
        assert!(d.message.contains("got 3"));
    }

    #[test]
    fn warnings_are_warnings() {
        assert_eq!(warn_memory_demoted("m", Span::DUMMY).severity, Severity::Warning);
        assert_eq!(warn_real_to_bits(1.5, Span::DUMMY).severity, Severity::Warning);
        assert_eq!(warn_blocking_memory_write(Span::DUMMY).severity, Severity::Warning);
    }

    #[test]
    fn elab_error_display() {
        let err = ElabError {
            diagnostic: error_not_constant("loop bound", Span::DUMMY),
        };
        assert_eq!(format!("{err}"), "E300: loop bound is not constant");
    }

    #[test]
    fn const_func_diagnostics_link_call_site() {
        let d = error_const_func_not_constant(Span::DUMMY, Span::DUMMY);
        assert_eq!(d.code, E305);
        assert_eq!(d.labels.len(), 1);
        let d = error_const_func_unsupported(Span::DUMMY, Span::DUMMY);
        assert_eq!(d.code, E307);
    }
}
