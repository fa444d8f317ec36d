//! JIT backend built on Cranelift
//!
//! Programs are executed by a native step loop. Callables stay ordinary Rust
//! closures: the loop reaches them through a trampoline, so no value ever
//! crosses into generated code. The loop only takes the step count as an
//! argument, so a backend compiles it once and shares it between programs.

mod compiler;
mod runtime;

pub use compiler::{Kernel, KernelCompiler};

use std::fmt;
use std::sync::{Arc, OnceLock};

use self::runtime::JitFrame;
use super::frame::Frame;
use super::program::Program;
use super::{Backend, BackendError, Executable, RuntimeError};
use crate::value::Value;

struct Shared {
    compiler: Result<KernelCompiler, BackendError>,
    kernel: OnceLock<Result<Kernel, BackendError>>,
}

impl Shared {
    fn kernel(&self) -> Result<&Kernel, BackendError> {
        self.kernel
            .get_or_init(|| {
                let compiler = self.compiler.as_ref().map_err(Clone::clone)?;
                let result = compiler.compile();
                match &result {
                    Ok(_) => log::info!("compiled JIT step kernel"),
                    Err(err) => log::warn!("JIT kernel compilation failed: {}", err),
                }
                result
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn is_compiled(&self) -> bool {
        matches!(self.kernel.get(), Some(Ok(_)))
    }
}

/// Backend that runs programs through a native step loop
///
/// With warm-up enabled (the default) the kernel is built inside
/// `Backend::compile`, so compilation errors surface there. Otherwise it is
/// built on the first call and a failure is reported by every call.
#[derive(Clone)]
pub struct CraneliftBackend {
    shared: Arc<Shared>,
    warm_up: bool,
}

impl CraneliftBackend {
    pub fn new() -> Self {
        let compiler = KernelCompiler::new();
        if let Err(err) = &compiler {
            log::warn!("JIT backend unavailable on this host: {}", err);
        }
        Self {
            shared: Arc::new(Shared {
                compiler,
                kernel: OnceLock::new(),
            }),
            warm_up: true,
        }
    }

    pub fn warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Whether the step kernel has been compiled yet
    pub fn is_compiled(&self) -> bool {
        self.shared.is_compiled()
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CraneliftBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CraneliftBackend")
            .field("warm_up", &self.warm_up)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

struct JitExecutable {
    program: Arc<Program>,
    shared: Arc<Shared>,
}

impl Executable for JitExecutable {
    fn invoke(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let mut state = JitFrame::new(Frame::new(&self.program, args)?);
        let kernel = self.shared.kernel()?;

        // SAFETY: `steps` is this program's own step count and `state` lives
        // until `finish`.
        let status = unsafe { kernel.run(state.as_ptr(), self.program.step_count()) };
        state.finish(status)
    }
}

impl Backend for CraneliftBackend {
    fn name(&self) -> &str {
        "cranelift"
    }

    fn compile(&self, program: Arc<Program>) -> Result<Arc<dyn Executable>, BackendError> {
        if self.warm_up {
            self.shared.kernel()?;
        }
        Ok(Arc::new(JitExecutable {
            program,
            shared: self.shared.clone(),
        }))
    }
}
