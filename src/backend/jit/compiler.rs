//! Cranelift code generation for the step kernel
//!
//! The kernel is the execution loop of a program: it calls the step
//! trampoline for indices `0..steps` and leaves early with the first nonzero
//! status. It is the same for every program, so a backend compiles it once.

use cranelift::prelude::*;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};

use super::runtime::{get_trampoline_ptr, STEP_OK, TRAMPOLINE_SYMBOL};
use crate::backend::BackendError;

/// Signature: fn(frame: *mut u8, steps: usize) -> status
pub type KernelFn = unsafe extern "C" fn(*mut u8, usize) -> i32;

const KERNEL_SYMBOL: &str = "graphfuse_kernel";

fn jit_error(context: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Jit(format!("{}: {}", context, e))
}

/// Native step loop
pub struct Kernel {
    /// Keeps the code alive
    _module: JITModule,
    entry: KernelFn,
}

// SAFETY: the module is never touched again after finalization and the
// generated code keeps no state of its own, so the entry point may be called
// from any thread.
unsafe impl Send for Kernel {}
unsafe impl Sync for Kernel {}

impl Kernel {
    /// Run the first `steps` steps of the frame behind `frame`.
    ///
    /// SAFETY: `frame` must point to a live `JitFrame` whose program has at
    /// least `steps` steps.
    pub unsafe fn run(&self, frame: *mut u8, steps: usize) -> i32 {
        (self.entry)(frame, steps)
    }
}

/// Builds kernels for the host ISA
pub struct KernelCompiler {
    isa: OwnedTargetIsa,
}

impl KernelCompiler {
    pub fn new() -> Result<Self, BackendError> {
        let mut flag_builder = settings::builder();
        for (name, value) in [
            ("use_colocated_libcalls", "false"),
            ("is_pic", "false"),
            ("opt_level", "speed"),
        ] {
            flag_builder
                .set(name, value)
                .map_err(|e| jit_error("Failed to set flag", e))?;
        }

        let isa_builder = cranelift_codegen::isa::lookup(target_lexicon::Triple::host())
            .map_err(|e| jit_error("Failed to create ISA builder", e))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| jit_error("Failed to create ISA", e))?;

        Ok(Self { isa })
    }

    /// Compile the step loop
    pub fn compile(&self) -> Result<Kernel, BackendError> {
        let mut builder =
            JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        builder.symbol(TRAMPOLINE_SYMBOL, get_trampoline_ptr() as *const u8);
        let mut module = JITModule::new(builder);

        let ptr_type = module.target_config().pointer_type();

        let mut step_sig = module.make_signature();
        step_sig.params.push(AbiParam::new(ptr_type)); // frame
        step_sig.params.push(AbiParam::new(ptr_type)); // step index (usize)
        step_sig.returns.push(AbiParam::new(types::I32));
        let step_id = module
            .declare_function(TRAMPOLINE_SYMBOL, Linkage::Import, &step_sig)
            .map_err(|e| jit_error("Failed to declare trampoline", e))?;

        let mut ctx = module.make_context();
        ctx.func.signature.params.push(AbiParam::new(ptr_type)); // frame
        ctx.func.signature.params.push(AbiParam::new(ptr_type)); // steps
        ctx.func.signature.returns.push(AbiParam::new(types::I32));

        let func_id = module
            .declare_function(KERNEL_SYMBOL, Linkage::Export, &ctx.func.signature)
            .map_err(|e| jit_error("Failed to declare kernel", e))?;

        let mut builder_context = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_context);
            Self::build_kernel(&mut builder, &mut module, step_id, ptr_type);
            builder.finalize();
        }

        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| jit_error("Failed to define kernel", e))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| jit_error("Failed to finalize", e))?;

        let code_ptr = module.get_finalized_function(func_id);
        let entry: KernelFn = unsafe { std::mem::transmute(code_ptr) };

        Ok(Kernel {
            _module: module,
            entry,
        })
    }

    /// entry(frame, steps) -> header(0)
    /// header(i):  i < steps ? body : exit(OK)
    /// body:       status = step(frame, i); status != 0 ? exit(status) : header(i + 1)
    /// exit(s):    return s
    fn build_kernel(
        builder: &mut FunctionBuilder,
        module: &mut JITModule,
        step_id: FuncId,
        ptr_type: Type,
    ) {
        let step_ref = module.declare_func_in_func(step_id, builder.func);

        let entry_block = builder.create_block();
        let header_block = builder.create_block();
        let body_block = builder.create_block();
        let exit_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.append_block_param(header_block, ptr_type);
        builder.append_block_param(exit_block, types::I32);

        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);
        let frame_ptr = builder.block_params(entry_block)[0];
        let steps = builder.block_params(entry_block)[1];
        let zero = builder.ins().iconst(ptr_type, 0);
        builder.ins().jump(header_block, &[zero]);

        builder.switch_to_block(header_block);
        let index = builder.block_params(header_block)[0];
        let in_range = builder.ins().icmp(IntCC::UnsignedLessThan, index, steps);
        let ok = builder.ins().iconst(types::I32, STEP_OK as i64);
        builder
            .ins()
            .brif(in_range, body_block, &[], exit_block, &[ok]);

        builder.switch_to_block(body_block);
        builder.seal_block(body_block);
        let call = builder.ins().call(step_ref, &[frame_ptr, index]);
        let status = builder.inst_results(call)[0];
        let next = builder.ins().iadd_imm(index, 1);
        builder
            .ins()
            .brif(status, exit_block, &[status], header_block, &[next]);
        builder.seal_block(header_block);

        builder.switch_to_block(exit_block);
        builder.seal_block(exit_block);
        let status = builder.block_params(exit_block)[0];
        builder.ins().return_(&[status]);
    }
}
