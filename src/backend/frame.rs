use super::program::{Operand, Program};
use super::RuntimeError;
use crate::value::Value;

/// Register file for one invocation of a program
pub(crate) struct Frame<'p> {
    program: &'p Program,
    registers: Vec<Value>,
}

impl<'p> Frame<'p> {
    pub fn new(program: &'p Program, args: &[Value]) -> Result<Self, RuntimeError> {
        if args.len() != program.arity {
            return Err(RuntimeError::ArgumentCount {
                unit: program.name.clone(),
                expected: program.arity,
                got: args.len(),
            });
        }

        let mut registers = Vec::with_capacity(program.registers);
        registers.extend_from_slice(args);
        registers.resize(program.registers, Value::Unit);
        Ok(Self { program, registers })
    }

    fn load(&self, operand: Operand) -> Value {
        match operand {
            Operand::Register(index) => self.registers[index].clone(),
            Operand::Const(index) => self.program.consts[index].clone(),
        }
    }

    /// Run the call at `index`, storing its result in the step's register
    pub fn run_step(&mut self, index: usize) -> Result<(), RuntimeError> {
        let program = self.program;
        let step = &program.steps[index];
        let args: Vec<Value> = step.args.iter().map(|arg| self.load(*arg)).collect();

        let value = step.callee.call(&args).map_err(|source| RuntimeError::Call {
            symbol: step.func,
            callable: step.callee.name().to_string(),
            source,
        })?;
        self.registers[step.target] = value;
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.program.steps.len()
    }

    pub fn into_output(mut self) -> Value {
        match self.program.output {
            Operand::Register(index) => std::mem::take(&mut self.registers[index]),
            Operand::Const(index) => self.program.consts[index].clone(),
        }
    }
}
