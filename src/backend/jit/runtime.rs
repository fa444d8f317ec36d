//! Runtime support for JIT kernels
//!
//! Kernels never touch `Value`s directly. They call back into
//! `run_step_trampoline` once per step, passing the opaque frame pointer they
//! were invoked with, and stop at the first nonzero status.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::backend::frame::Frame;
use crate::backend::RuntimeError;
use crate::value::Value;

/// Symbol the trampoline is registered under in every JIT module
pub const TRAMPOLINE_SYMBOL: &str = "graphfuse_run_step";

pub const STEP_OK: i32 = 0;
pub const STEP_FAILED: i32 = 1;
pub const STEP_PANICKED: i32 = 2;

/// Signature: fn(frame: *mut u8, step_index: usize) -> status
pub type StepFnPtr = extern "C" fn(*mut u8, usize) -> i32;

/// State shared between one kernel invocation and the trampoline
pub(crate) struct JitFrame<'p> {
    frame: Frame<'p>,
    failure: Option<RuntimeError>,
    panic: Option<Box<dyn Any + Send>>,
}

impl<'p> JitFrame<'p> {
    pub fn new(frame: Frame<'p>) -> Self {
        Self {
            frame,
            failure: None,
            panic: None,
        }
    }

    pub fn as_ptr(&mut self) -> *mut u8 {
        self as *mut JitFrame<'p> as *mut u8
    }

    /// Turn the status returned by the kernel into the call's result.
    ///
    /// A panic raised by a callable is resumed here, on the caller's side of
    /// the kernel.
    pub fn finish(mut self, status: i32) -> Result<Value, RuntimeError> {
        if let Some(payload) = self.panic.take() {
            panic::resume_unwind(payload);
        }
        match status {
            STEP_OK => Ok(self.frame.into_output()),
            STEP_FAILED => Err(self
                .failure
                .take()
                .unwrap_or(RuntimeError::KernelStatus(status))),
            other => Err(RuntimeError::KernelStatus(other)),
        }
    }
}

/// Get the function pointer to the trampoline for registration with Cranelift
pub fn get_trampoline_ptr() -> StepFnPtr {
    run_step_trampoline
}

/// Run step `index` of the frame behind `state`
///
/// SAFETY: `state` must come from `JitFrame::as_ptr` on a frame that outlives
/// the kernel call. Unwinding never crosses this boundary.
extern "C" fn run_step_trampoline(state: *mut u8, index: usize) -> i32 {
    let state = unsafe { &mut *(state as *mut JitFrame<'_>) };

    match panic::catch_unwind(AssertUnwindSafe(|| state.frame.run_step(index))) {
        Ok(Ok(())) => STEP_OK,
        Ok(Err(err)) => {
            state.failure = Some(err);
            STEP_FAILED
        }
        Err(payload) => {
            state.panic = Some(payload);
            STEP_PANICKED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Program;
    use crate::codegen::{parse_wrapper, Binding, Bindings};
    use crate::symbols::Symbol;
    use crate::value::{CallError, Callable};

    fn program(func: Callable) -> Program {
        let unit = parse_wrapper(
            "fn f(var0) {\n global func0;\n ret0 = func0(var0);\n return ret0;\n}",
        )
        .unwrap();
        let mut bindings = Bindings::new();
        bindings.insert(Symbol::parse("func0").unwrap(), Binding::Func(func));
        Program::link(&unit, &bindings).unwrap()
    }

    #[test]
    fn test_trampoline_runs_step() {
        let program = program(Callable::new("inc", |args| {
            Ok(Value::Int(args[0].as_int()? + 1))
        }));
        let mut state = JitFrame::new(Frame::new(&program, &[Value::Int(41)]).unwrap());

        let status = get_trampoline_ptr()(state.as_ptr(), 0);
        assert_eq!(status, STEP_OK);
        assert_eq!(state.finish(status), Ok(Value::Int(42)));
    }

    #[test]
    fn test_trampoline_records_failure() {
        let program = program(Callable::new("boom", |_| Err(CallError::failed("boom"))));
        let mut state = JitFrame::new(Frame::new(&program, &[Value::Int(0)]).unwrap());

        let status = get_trampoline_ptr()(state.as_ptr(), 0);
        assert_eq!(status, STEP_FAILED);
        assert!(matches!(
            state.finish(status),
            Err(RuntimeError::Call { ref callable, .. }) if callable == "boom"
        ));
    }

    #[test]
    fn test_trampoline_catches_panic() {
        let program = program(Callable::new("panics", |_| panic!("callable panicked")));
        let mut state = JitFrame::new(Frame::new(&program, &[Value::Int(0)]).unwrap());

        let status = get_trampoline_ptr()(state.as_ptr(), 0);
        assert_eq!(status, STEP_PANICKED);

        let resumed = panic::catch_unwind(AssertUnwindSafe(|| state.finish(status)));
        assert!(resumed.is_err());
    }

    #[test]
    fn test_unknown_status() {
        let program = program(Callable::new("id", |args| Ok(args[0].clone())));
        let state = JitFrame::new(Frame::new(&program, &[Value::Int(0)]).unwrap());
        assert_eq!(state.finish(7), Err(RuntimeError::KernelStatus(7)));
    }
}
