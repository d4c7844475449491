//! The virtual CPU
//!
//! Eight signed 64-bit registers, a program counter, and a fetch-decode-
//! execute loop over whitespace-separated instruction text. Decoding happens
//! at fetch time, so a malformed line the program counter never reaches is
//! never an error. A faulting instruction halts the program with its error
//! attached; the loop never skips past a fault.
//!
//! The CPU touches nothing but its own register file. Memory and the file
//! store are reachable only through the kernel's syscall surface, and PRINT
//! snapshots leave through a sink the caller supplies.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of general-purpose registers
pub const REGISTER_COUNT: usize = 8;

/// Default ceiling on instructions executed per `run()` invocation.
///
/// JUMP permits loops the instruction set has no way to exit, so the loop
/// carries a fuel bound instead of trusting programs to terminate.
pub const DEFAULT_STEP_LIMIT: usize = 65_536;

/// Execution state of the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuState {
    /// A program is loaded (or none yet); nothing is running
    #[default]
    Ready,
    /// Inside the fetch-execute loop
    Running,
    /// The last run finished, by completion or by fault
    Halted,
}

/// Status flags. Arithmetic instructions produce them after every result
/// write; no current instruction consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub zero: bool,
    pub carry: bool,
    pub negative: bool,
}

/// CPU fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuError {
    /// Blank instruction line
    EmptyInstruction,
    /// First token is not a known opcode
    UnknownOpcode(String),
    /// Operand list has the wrong length for the opcode
    WrongOperandCount {
        opcode: &'static str,
        expected: usize,
        found: usize,
    },
    /// Operand failed to parse as the expected integer
    BadOperand(String),
    /// Register index outside `[0, 8)`
    BadRegister(i64),
    /// DIV with a zero divisor
    DivisionByZero,
    /// The step limit tripped mid-run
    StepLimit(usize),
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::EmptyInstruction => write!(f, "empty instruction"),
            CpuError::UnknownOpcode(op) => write!(f, "unknown opcode: {}", op),
            CpuError::WrongOperandCount {
                opcode,
                expected,
                found,
            } => write!(
                f,
                "{} expects {} operand(s), found {}",
                opcode, expected, found
            ),
            CpuError::BadOperand(tok) => write!(f, "malformed operand: {}", tok),
            CpuError::BadRegister(idx) => write!(f, "register index out of range: {}", idx),
            CpuError::DivisionByZero => write!(f, "division by zero"),
            CpuError::StepLimit(limit) => {
                write!(f, "step limit exceeded after {} instructions", limit)
            }
        }
    }
}

impl std::error::Error for CpuError {}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// register[reg] = value
    Load { reg: usize, value: i64 },
    /// register[dst] += register[src]
    Add { dst: usize, src: usize },
    /// register[dst] -= register[src]
    Sub { dst: usize, src: usize },
    /// register[dst] *= register[src]
    Mul { dst: usize, src: usize },
    /// register[dst] = floor(register[dst] / register[src])
    Div { dst: usize, src: usize },
    /// Emit a snapshot of all registers
    Print,
    /// PC = target
    Jump { target: usize },
    /// register[reg] = pseudo-random integer in [1, 100]
    Rand { reg: usize },
}

impl Instruction {
    /// Decode one line of instruction text
    pub fn parse(line: &str) -> Result<Self, CpuError> {
        let mut tokens = line.split_whitespace();
        let opcode = tokens.next().ok_or(CpuError::EmptyInstruction)?;
        let operands: Vec<&str> = tokens.collect();

        match opcode {
            "LOAD" => {
                expect_operands("LOAD", &operands, 2)?;
                Ok(Instruction::Load {
                    reg: parse_register(operands[0])?,
                    value: parse_literal(operands[1])?,
                })
            }
            "ADD" => {
                expect_operands("ADD", &operands, 2)?;
                Ok(Instruction::Add {
                    dst: parse_register(operands[0])?,
                    src: parse_register(operands[1])?,
                })
            }
            "SUB" => {
                expect_operands("SUB", &operands, 2)?;
                Ok(Instruction::Sub {
                    dst: parse_register(operands[0])?,
                    src: parse_register(operands[1])?,
                })
            }
            "MUL" => {
                expect_operands("MUL", &operands, 2)?;
                Ok(Instruction::Mul {
                    dst: parse_register(operands[0])?,
                    src: parse_register(operands[1])?,
                })
            }
            "DIV" => {
                expect_operands("DIV", &operands, 2)?;
                Ok(Instruction::Div {
                    dst: parse_register(operands[0])?,
                    src: parse_register(operands[1])?,
                })
            }
            "PRINT" => {
                expect_operands("PRINT", &operands, 0)?;
                Ok(Instruction::Print)
            }
            "JUMP" => {
                expect_operands("JUMP", &operands, 1)?;
                Ok(Instruction::Jump {
                    target: parse_target(operands[0])?,
                })
            }
            "RAND" => {
                expect_operands("RAND", &operands, 1)?;
                Ok(Instruction::Rand {
                    reg: parse_register(operands[0])?,
                })
            }
            other => Err(CpuError::UnknownOpcode(other.to_string())),
        }
    }
}

fn expect_operands(opcode: &'static str, operands: &[&str], expected: usize) -> Result<(), CpuError> {
    if operands.len() == expected {
        Ok(())
    } else {
        Err(CpuError::WrongOperandCount {
            opcode,
            expected,
            found: operands.len(),
        })
    }
}

fn parse_literal(tok: &str) -> Result<i64, CpuError> {
    tok.parse()
        .map_err(|_| CpuError::BadOperand(tok.to_string()))
}

fn parse_register(tok: &str) -> Result<usize, CpuError> {
    let idx = parse_literal(tok)?;
    if (0..REGISTER_COUNT as i64).contains(&idx) {
        Ok(idx as usize)
    } else {
        Err(CpuError::BadRegister(idx))
    }
}

fn parse_target(tok: &str) -> Result<usize, CpuError> {
    tok.parse()
        .map_err(|_| CpuError::BadOperand(tok.to_string()))
}

/// xorshift64 PRNG, seeded from the system clock by default
#[derive(Debug, Clone)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // xorshift has a single fixed point at zero
        Self {
            state: if seed == 0 { 0xDEAD_BEEF_CAFE_BABE } else { seed },
        }
    }

    fn seeded_from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x1234_5678_9ABC_DEF0);
        Self::new(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform-ish value in `[1, 100]`
    fn next_percent(&mut self) -> i64 {
        (self.next_u64() % 100) as i64 + 1
    }
}

/// Floor division: rounds toward negative infinity, like the DIV contract
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

/// The virtual CPU
#[derive(Debug, Clone)]
pub struct Cpu {
    regs: [i64; REGISTER_COUNT],
    pc: usize,
    flags: Flags,
    state: CpuState,
    program: Vec<String>,
    step_limit: usize,
    rng: XorShift64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            pc: 0,
            flags: Flags::default(),
            state: CpuState::Ready,
            program: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            rng: XorShift64::seeded_from_clock(),
        }
    }

    /// A CPU with a fixed RNG seed, for deterministic RAND
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: XorShift64::new(seed),
            ..Self::new()
        }
    }

    pub fn set_step_limit(&mut self, limit: usize) {
        self.step_limit = limit;
    }

    pub fn registers(&self) -> &[i64; REGISTER_COUNT] {
        &self.regs
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Load a program and rewind: PC back to 0, state back to Ready.
    /// Register contents survive across loads.
    pub fn load(&mut self, program: Vec<String>) {
        self.program = program;
        self.pc = 0;
        self.state = CpuState::Ready;
    }

    /// Run the loaded program to completion.
    ///
    /// Fetches, decodes, and executes one instruction at a time until the PC
    /// runs off the end of the program or an instruction faults. Either way
    /// the CPU ends Halted; a fault is returned to the caller, never skipped.
    /// PRINT snapshots are pushed into `out`.
    pub fn run(&mut self, out: &mut dyn FnMut(String)) -> Result<(), CpuError> {
        self.state = CpuState::Running;
        let mut steps = 0;

        while self.pc < self.program.len() {
            if steps == self.step_limit {
                self.state = CpuState::Halted;
                return Err(CpuError::StepLimit(self.step_limit));
            }
            steps += 1;

            let decoded = Instruction::parse(&self.program[self.pc]);
            let result = decoded.and_then(|instr| self.execute(instr, out));
            if let Err(err) = result {
                self.state = CpuState::Halted;
                return Err(err);
            }
        }

        self.state = CpuState::Halted;
        Ok(())
    }

    /// Execute one decoded instruction and advance the PC.
    /// JUMP replaces the PC; everything else increments it.
    fn execute(
        &mut self,
        instr: Instruction,
        out: &mut dyn FnMut(String),
    ) -> Result<(), CpuError> {
        match instr {
            Instruction::Jump { target } => {
                self.pc = target;
                return Ok(());
            }
            Instruction::Load { reg, value } => self.regs[reg] = value,
            Instruction::Add { dst, src } => {
                let (value, overflow) = self.regs[dst].overflowing_add(self.regs[src]);
                self.alu_write(dst, value, overflow);
            }
            Instruction::Sub { dst, src } => {
                let (value, overflow) = self.regs[dst].overflowing_sub(self.regs[src]);
                self.alu_write(dst, value, overflow);
            }
            Instruction::Mul { dst, src } => {
                let (value, overflow) = self.regs[dst].overflowing_mul(self.regs[src]);
                self.alu_write(dst, value, overflow);
            }
            Instruction::Div { dst, src } => {
                if self.regs[src] == 0 {
                    return Err(CpuError::DivisionByZero);
                }
                let value = floor_div(self.regs[dst], self.regs[src]);
                self.alu_write(dst, value, false);
            }
            Instruction::Print => out(format!("Register Dump: {:?}", self.regs)),
            Instruction::Rand { reg } => self.regs[reg] = self.rng.next_percent(),
        }
        self.pc += 1;
        Ok(())
    }

    fn alu_write(&mut self, dst: usize, value: i64, carry: bool) {
        self.regs[dst] = value;
        self.flags = Flags {
            zero: value == 0,
            carry,
            negative: value < 0,
        };
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    /// Run a program on a fresh CPU, returning it plus PRINT output
    fn run_program(lines: &[&str]) -> (Cpu, Vec<String>, Result<(), CpuError>) {
        let mut cpu = Cpu::new();
        cpu.load(program(lines));
        let mut out = Vec::new();
        let result = cpu.run(&mut |line| out.push(line));
        (cpu, out, result)
    }

    #[test]
    fn test_load_and_add() {
        let (cpu, _, result) = run_program(&["LOAD 0 40", "LOAD 1 2", "ADD 0 1"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], 42);
        assert_eq!(cpu.registers()[1], 2);
    }

    #[test]
    fn test_sub_and_mul() {
        let (cpu, _, result) =
            run_program(&["LOAD 0 10", "LOAD 1 4", "SUB 0 1", "LOAD 2 3", "MUL 0 2"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], 18);
    }

    #[test]
    fn test_div_floors() {
        let (cpu, _, result) = run_program(&["LOAD 0 7", "LOAD 1 2", "DIV 0 1"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], 3);
    }

    #[test]
    fn test_div_floors_toward_negative_infinity() {
        let (cpu, _, result) = run_program(&["LOAD 0 -7", "LOAD 1 2", "DIV 0 1"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], -4);

        let (cpu, _, result) = run_program(&["LOAD 0 7", "LOAD 1 -2", "DIV 0 1"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], -4);
    }

    #[test]
    fn test_div_by_zero_faults() {
        let (cpu, _, result) = run_program(&["LOAD 0 7", "LOAD 1 0", "DIV 0 1"]);
        assert_eq!(result, Err(CpuError::DivisionByZero));
        assert_eq!(cpu.state(), CpuState::Halted);
        // The dividend register is untouched by the faulting DIV
        assert_eq!(cpu.registers()[0], 7);
    }

    #[test]
    fn test_print_emits_register_snapshot() {
        let (_, out, result) = run_program(&["LOAD 0 1", "LOAD 1 2", "PRINT"]);
        result.unwrap();
        assert_eq!(out, vec!["Register Dump: [1, 2, 0, 0, 0, 0, 0, 0]"]);
    }

    #[test]
    fn test_jump_skips_forward() {
        let (cpu, _, result) = run_program(&["JUMP 2", "LOAD 0 99", "LOAD 1 5"]);
        result.unwrap();
        assert_eq!(cpu.registers()[0], 0);
        assert_eq!(cpu.registers()[1], 5);
    }

    #[test]
    fn test_jump_off_the_end_halts() {
        let (cpu, _, result) = run_program(&["LOAD 0 1", "JUMP 10"]);
        result.unwrap();
        assert_eq!(cpu.state(), CpuState::Halted);
    }

    #[test]
    fn test_tight_jump_loop_trips_step_limit() {
        let mut cpu = Cpu::new();
        cpu.set_step_limit(100);
        cpu.load(program(&["LOAD 0 1", "JUMP 0"]));
        let result = cpu.run(&mut |_| {});
        assert_eq!(result, Err(CpuError::StepLimit(100)));
        assert_eq!(cpu.state(), CpuState::Halted);
    }

    #[test]
    fn test_rand_stays_in_range() {
        let mut cpu = Cpu::with_seed(7);
        for _ in 0..200 {
            cpu.load(program(&["RAND 3"]));
            cpu.run(&mut |_| {}).unwrap();
            let value = cpu.registers()[3];
            assert!((1..=100).contains(&value), "out of range: {}", value);
        }
    }

    #[test]
    fn test_rand_is_deterministic_under_a_seed() {
        let mut a = Cpu::with_seed(42);
        let mut b = Cpu::with_seed(42);
        for cpu in [&mut a, &mut b] {
            cpu.load(program(&["RAND 0", "RAND 1", "RAND 2"]));
            cpu.run(&mut |_| {}).unwrap();
        }
        assert_eq!(a.registers(), b.registers());
    }

    #[test]
    fn test_unknown_opcode_faults() {
        let (_, _, result) = run_program(&["NOP"]);
        assert_eq!(result, Err(CpuError::UnknownOpcode("NOP".to_string())));
    }

    #[test]
    fn test_wrong_operand_count_faults() {
        let (_, _, result) = run_program(&["LOAD 0"]);
        assert_eq!(
            result,
            Err(CpuError::WrongOperandCount {
                opcode: "LOAD",
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_non_integer_operand_faults() {
        let (_, _, result) = run_program(&["LOAD 0 abc"]);
        assert_eq!(result, Err(CpuError::BadOperand("abc".to_string())));
    }

    #[test]
    fn test_register_index_out_of_range_faults() {
        let (_, _, result) = run_program(&["LOAD 8 1"]);
        assert_eq!(result, Err(CpuError::BadRegister(8)));

        let (_, _, result) = run_program(&["LOAD -1 1"]);
        assert_eq!(result, Err(CpuError::BadRegister(-1)));
    }

    #[test]
    fn test_fault_stops_the_loop() {
        // The instruction after the fault must not execute
        let (cpu, _, result) = run_program(&["LOAD 0 1", "BOGUS", "LOAD 1 5"]);
        assert!(result.is_err());
        assert_eq!(cpu.registers()[1], 0);
    }

    #[test]
    fn test_malformed_line_past_the_end_is_never_decoded() {
        let (cpu, _, result) = run_program(&["JUMP 2", "THIS IS NOT CODE"]);
        result.unwrap();
        assert_eq!(cpu.state(), CpuState::Halted);
    }

    #[test]
    fn test_state_transitions() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.state(), CpuState::Ready);
        cpu.load(program(&["LOAD 0 1"]));
        assert_eq!(cpu.state(), CpuState::Ready);
        cpu.run(&mut |_| {}).unwrap();
        assert_eq!(cpu.state(), CpuState::Halted);
        // Reloading rewinds to Ready
        cpu.load(program(&["PRINT"]));
        assert_eq!(cpu.state(), CpuState::Ready);
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn test_registers_survive_reload() {
        let mut cpu = Cpu::new();
        cpu.load(program(&["LOAD 5 123"]));
        cpu.run(&mut |_| {}).unwrap();
        cpu.load(program(&["PRINT"]));
        assert_eq!(cpu.registers()[5], 123);
    }

    #[test]
    fn test_arithmetic_produces_flags() {
        let (cpu, _, result) = run_program(&["LOAD 0 3", "LOAD 1 3", "SUB 0 1"]);
        result.unwrap();
        assert!(cpu.flags().zero);
        assert!(!cpu.flags().negative);

        let (cpu, _, result) = run_program(&["LOAD 0 1", "LOAD 1 2", "SUB 0 1"]);
        result.unwrap();
        assert!(cpu.flags().negative);
        assert!(!cpu.flags().zero);
    }

    #[test]
    fn test_overflow_sets_carry_and_wraps() {
        let max = i64::MAX.to_string();
        let prog: Vec<String> = vec![
            format!("LOAD 0 {}", max),
            "LOAD 1 1".to_string(),
            "ADD 0 1".to_string(),
        ];
        let mut cpu = Cpu::new();
        cpu.load(prog);
        cpu.run(&mut |_| {}).unwrap();
        assert!(cpu.flags().carry);
        assert_eq!(cpu.registers()[0], i64::MIN);
    }

    #[test]
    fn test_empty_program_halts_immediately() {
        let (cpu, out, result) = run_program(&[]);
        result.unwrap();
        assert_eq!(cpu.state(), CpuState::Halted);
        assert!(out.is_empty());
    }

    #[test]
    fn test_floor_div_helper() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(-7, -2), 3);
        assert_eq!(floor_div(6, 3), 2);
        assert_eq!(floor_div(-6, 3), -2);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            CpuError::UnknownOpcode("NOP".to_string()).to_string(),
            "unknown opcode: NOP"
        );
        assert_eq!(CpuError::DivisionByZero.to_string(), "division by zero");
        assert_eq!(
            CpuError::StepLimit(100).to_string(),
            "step limit exceeded after 100 instructions"
        );
    }
}
