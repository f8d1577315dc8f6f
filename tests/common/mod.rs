//! Test helpers: a tiny interpreter for the x86-64 subset the compiler emits,
//! and a native runner for hosts that can assemble the output.

#![allow(dead_code)]

use std::collections::HashMap;

const STACK_TOP: i64 = 0x10000;
const RETURN_SENTINEL: i64 = -1;
const MAX_STEPS: usize = 1_000_000;

#[derive(Debug, Clone)]
enum Operand {
  Imm(i64),
  Reg(String),
  Mem { base: String, disp: i64 },
  Label(String),
}

#[derive(Debug, Clone)]
struct Instr {
  mnemonic: String,
  operands: Vec<Operand>,
}

fn parse_operand(text: &str) -> Result<Operand, String> {
  let text = text.trim();
  if let Some(imm) = text.strip_prefix('$') {
    return imm
      .parse()
      .map(Operand::Imm)
      .map_err(|err| format!("bad immediate {text:?}: {err}"));
  }
  if let Some(reg) = text.strip_prefix('%') {
    return Ok(Operand::Reg(reg.to_string()));
  }
  if let Some(open) = text.find("(%") {
    let disp = match &text[..open] {
      "" => 0,
      disp => disp
        .parse()
        .map_err(|err| format!("bad displacement {text:?}: {err}"))?,
    };
    let base = text[open + 2..]
      .strip_suffix(')')
      .ok_or_else(|| format!("bad memory operand {text:?}"))?;
    return Ok(Operand::Mem {
      base: base.to_string(),
      disp,
    });
  }
  Ok(Operand::Label(text.to_string()))
}

struct Machine {
  regs: HashMap<String, i64>,
  memory: HashMap<i64, i64>,
  /// Operands of the last `cmp`, as (destination, source).
  flags: (i64, i64),
}

impl Machine {
  fn new() -> Self {
    let mut regs = HashMap::new();
    for reg in ["rax", "rdi", "rdx", "rbp"] {
      regs.insert(reg.to_string(), 0);
    }
    regs.insert("rsp".to_string(), STACK_TOP);
    Self {
      regs,
      memory: HashMap::new(),
      flags: (0, 0),
    }
  }

  fn reg(&self, name: &str) -> Result<i64, String> {
    match name {
      "al" => Ok(self.reg("rax")? & 0xff),
      _ => self
        .regs
        .get(name)
        .copied()
        .ok_or_else(|| format!("unknown register %{name}")),
    }
  }

  fn set_reg(&mut self, name: &str, value: i64) -> Result<(), String> {
    match name {
      "al" => {
        let rax = self.reg("rax")?;
        self.regs.insert("rax".to_string(), (rax & !0xff) | (value & 0xff));
      }
      _ if self.regs.contains_key(name) => {
        self.regs.insert(name.to_string(), value);
      }
      _ => return Err(format!("unknown register %{name}")),
    }
    Ok(())
  }

  fn address(&self, operand: &Operand) -> Result<i64, String> {
    match operand {
      Operand::Mem { base, disp } => Ok(self.reg(base)? + disp),
      other => Err(format!("{other:?} has no address")),
    }
  }

  fn load_mem(&self, addr: i64) -> Result<i64, String> {
    if addr % 8 != 0 {
      return Err(format!("unaligned access at {addr:#x}"));
    }
    Ok(self.memory.get(&addr).copied().unwrap_or(0))
  }

  fn read(&self, operand: &Operand) -> Result<i64, String> {
    match operand {
      Operand::Imm(value) => Ok(*value),
      Operand::Reg(reg) => self.reg(reg),
      Operand::Mem { .. } => self.load_mem(self.address(operand)?),
      Operand::Label(label) => Err(format!("cannot read label {label}")),
    }
  }

  fn write(&mut self, operand: &Operand, value: i64) -> Result<(), String> {
    match operand {
      Operand::Reg(reg) => self.set_reg(reg, value),
      Operand::Mem { .. } => {
        let addr = self.address(operand)?;
        self.load_mem(addr)?;
        self.memory.insert(addr, value);
        Ok(())
      }
      other => Err(format!("cannot write to {other:?}")),
    }
  }

  fn push(&mut self, value: i64) -> Result<(), String> {
    let rsp = self.reg("rsp")? - 8;
    self.set_reg("rsp", rsp)?;
    self.memory.insert(rsp, value);
    Ok(())
  }

  fn pop(&mut self) -> Result<i64, String> {
    let rsp = self.reg("rsp")?;
    if rsp >= STACK_TOP {
      return Err("pop from an empty stack".to_string());
    }
    let value = self.load_mem(rsp)?;
    self.set_reg("rsp", rsp + 8)?;
    Ok(value)
  }
}

/// Execute the `main` procedure of an assembly listing and return `%rax`.
pub fn run(asm: &str) -> Result<i64, String> {
  let mut program = Vec::new();
  let mut labels = HashMap::new();

  for line in asm.lines().map(str::trim).filter(|line| !line.is_empty()) {
    if let Some(label) = line.strip_suffix(':') {
      labels.insert(label.to_string(), program.len());
      continue;
    }
    if line.starts_with('.') {
      continue;
    }
    let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let operands = rest
      .split(',')
      .filter(|op| !op.trim().is_empty())
      .map(parse_operand)
      .collect::<Result<Vec<_>, _>>()?;
    program.push(Instr {
      mnemonic: mnemonic.to_string(),
      operands,
    });
  }

  let mut pc = *labels.get("main").ok_or("no main label")?;
  let mut machine = Machine::new();
  machine.push(RETURN_SENTINEL)?;

  for _ in 0..MAX_STEPS {
    let instr = program.get(pc).ok_or("fell off the end of the program")?.clone();
    pc += 1;
    let ops = &instr.operands;
    let mnemonic = instr.mnemonic.as_str();
    let arg = move |i: usize| {
      ops
        .get(i)
        .ok_or_else(|| format!("{mnemonic} needs operand {i}"))
    };

    match mnemonic {
      "mov" | "movzb" => {
        let value = machine.read(arg(0)?)?;
        machine.write(arg(1)?, value)?;
      }
      "lea" => {
        let addr = machine.address(arg(0)?)?;
        machine.write(arg(1)?, addr)?;
      }
      "push" => {
        let value = machine.read(arg(0)?)?;
        machine.push(value)?;
      }
      "pop" => {
        let value = machine.pop()?;
        machine.write(arg(0)?, value)?;
      }
      "add" | "sub" | "imul" => {
        let src = machine.read(arg(0)?)?;
        let dst = machine.read(arg(1)?)?;
        let value = match mnemonic {
          "add" => dst.wrapping_add(src),
          "sub" => dst.wrapping_sub(src),
          _ => dst.wrapping_mul(src),
        };
        machine.write(arg(1)?, value)?;
      }
      "neg" => {
        let value = machine.read(arg(0)?)?;
        machine.write(arg(0)?, value.wrapping_neg())?;
      }
      "cqo" => {
        let rax = machine.reg("rax")?;
        machine.set_reg("rdx", if rax < 0 { -1 } else { 0 })?;
      }
      "idiv" => {
        let divisor = machine.read(arg(0)?)?;
        if divisor == 0 {
          return Err("division by zero".to_string());
        }
        let rax = machine.reg("rax")?;
        machine.set_reg("rax", rax.wrapping_div(divisor))?;
        machine.set_reg("rdx", rax.wrapping_rem(divisor))?;
      }
      "cmp" => {
        let src = machine.read(arg(0)?)?;
        let dst = machine.read(arg(1)?)?;
        machine.flags = (dst, src);
      }
      "sete" | "setne" | "setl" | "setle" => {
        let (dst, src) = machine.flags;
        let hit = match mnemonic {
          "sete" => dst == src,
          "setne" => dst != src,
          "setl" => dst < src,
          _ => dst <= src,
        };
        machine.write(arg(0)?, i64::from(hit))?;
      }
      "jmp" => match arg(0)? {
        Operand::Label(label) => {
          pc = *labels
            .get(label)
            .ok_or_else(|| format!("unknown label {label}"))?;
        }
        other => return Err(format!("bad jump target {other:?}")),
      },
      "ret" => {
        let target = machine.pop()?;
        if target != RETURN_SENTINEL {
          return Err(format!("returned to unexpected address {target:#x}"));
        }
        if machine.reg("rsp")? != STACK_TOP {
          return Err("stack not restored on return".to_string());
        }
        return machine.reg("rax");
      }
      other => return Err(format!("unsupported instruction {other}")),
    }
  }

  Err("step limit exceeded".to_string())
}

/// Compile `source` and interpret the result.
pub fn eval(source: &str) -> i64 {
  let asm = chibi::generate_assembly(source)
    .unwrap_or_else(|err| panic!("failed to compile {source:?}:\n{err}"));
  run(&asm).unwrap_or_else(|err| panic!("failed to run {source:?}: {err}\n{asm}"))
}

/// Assemble and run the output natively, returning the exit status.
/// `None` when no system C compiler is available.
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub fn run_native(source: &str, name: &str) -> Option<i32> {
  use std::process::Command;

  if Command::new("cc").arg("--version").output().is_err() {
    return None;
  }

  let asm = chibi::generate_assembly(source).expect("program compiles");
  let dir = std::env::temp_dir().join(format!("chibi-{}-{name}", std::process::id()));
  std::fs::create_dir_all(&dir).expect("create temp dir");
  let asm_path = dir.join("prog.s");
  let exe_path = dir.join("prog");
  std::fs::write(&asm_path, asm).expect("write assembly");

  let status = Command::new("cc")
    .arg("-o")
    .arg(&exe_path)
    .arg(&asm_path)
    .status()
    .expect("run cc");
  assert!(status.success(), "cc failed for {source:?}");

  let status = Command::new(&exe_path).status().expect("run program");
  let _ = std::fs::remove_dir_all(&dir);
  Some(status.code().expect("program exited normally"))
}
