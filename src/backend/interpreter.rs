use std::sync::Arc;

use super::frame::Frame;
use super::program::Program;
use super::{Backend, BackendError, Executable, RuntimeError};
use crate::value::Value;

/// Runs linked programs step by step without generating machine code
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterBackend;

impl InterpreterBackend {
    pub fn new() -> Self {
        Self
    }
}

struct Interpreted {
    program: Arc<Program>,
}

impl Executable for Interpreted {
    fn invoke(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let mut frame = Frame::new(&self.program, args)?;
        for index in 0..frame.step_count() {
            frame.run_step(index)?;
        }
        Ok(frame.into_output())
    }
}

impl Backend for InterpreterBackend {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn compile(&self, program: Arc<Program>) -> Result<Arc<dyn Executable>, BackendError> {
        Ok(Arc::new(Interpreted { program }))
    }
}
