//! A lifter from the textual `.mlil-exported` format.
//!
//! The format is a sequence of sections separated by blank lines. The first section is `BINARY`;
//! after it come at most one `SYMBOLS` section, at most one `MEMORY` section, and any number of
//! `FUNCTION` sections, in any order:
//!
//! ```text
//! BINARY
//! name hello.ko
//!
//! SYMBOLS
//! 1000 printk
//!
//! MEMORY
//! 8000 01 34 68 69 0a 00
//!
//! FUNCTION 2000 init_module
//! BLOCK
//! 2004 CALL ptr:1000/8 ptr:8000/8
//! 2008 OTHER
//! COMMENT 2008 some remark
//! ```
//!
//! Each instruction line is a hex address, then `CALL`, `TAILCALL`, or `OTHER`. A call is followed
//! by its destination, then its parameters. Values are written `<kind>:<hex>/<size>` where kind is
//! `const`, `ptr`, or `extern`, or as `undetermined/<size>`.

use crate::host::{CallOperands, Instruction, Operation, PossibleValue};
use crate::il::{BinaryImage, Expression, Function};
use crate::log::*;

/// A binary and all the functions lifted from an export.
#[derive(Debug)]
pub struct LiftedBinary {
    pub image: BinaryImage,
    pub functions: Vec<Function>,
}

/// Lift a `.mlil-exported` listing. Errors name the offending line.
pub fn lift_from(exported: &str) -> Result<LiftedBinary, String> {
    let exported = exported.replace("\r\n", "\n");
    let mut sections = exported
        .trim()
        .split("\n\n")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    let binary_section = sections
        .next()
        .and_then(|s| s.strip_prefix("BINARY"))
        .ok_or("Expected export to begin with a BINARY section")?;
    let name = parse_binary_section(binary_section)?;

    let mut image = BinaryImage::new(name);
    let mut functions = vec![];
    let mut seen_symbols = false;
    let mut seen_memory = false;
    for section in sections {
        let (header, body) = section.split_once('\n').unwrap_or((section, ""));
        let header = header.trim();
        if header == "SYMBOLS" {
            if std::mem::replace(&mut seen_symbols, true) {
                return Err("Duplicate SYMBOLS section".into());
            }
            parse_symbols_section(&mut image, body)?;
        } else if header == "MEMORY" {
            if std::mem::replace(&mut seen_memory, true) {
                return Err("Duplicate MEMORY section".into());
            }
            parse_memory_section(&mut image, body)?;
        } else if let Some(fn_header) = header.strip_prefix("FUNCTION ") {
            functions.push(parse_function_section(fn_header, body)?);
        } else {
            return Err(format!("Unknown section {:?}", header));
        }
    }

    debug!(
        "Lifted binary";
        "name" => &image.name,
        "symbols" => image.symbols.len(),
        "segments" => image.segments().len(),
        "functions" => functions.len(),
    );
    Ok(LiftedBinary { image, functions })
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("Bad hex number {:?}: {}", s, e))
}

fn parse_binary_section(body: &str) -> Result<String, String> {
    let mut name = None;
    for l in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match l.split_once(' ') {
            Some(("name", n)) if name.is_none() => name = Some(n.trim().to_owned()),
            _ => return Err(format!("Unexpected line in BINARY section: {:?}", l)),
        }
    }
    name.ok_or_else(|| "Expected `name` in BINARY section".into())
}

fn parse_symbols_section(image: &mut BinaryImage, body: &str) -> Result<(), String> {
    for l in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (addr, name) = l
            .split_once(' ')
            .ok_or_else(|| format!("Expected `<address> <name>`, got {:?}", l))?;
        let addr = parse_hex(addr).map_err(|e| format!("{} in line {:?}", e, l))?;
        let name = name.trim();
        if image.symbols.contains_key(name) {
            return Err(format!("Duplicate symbol in line {:?}", l));
        }
        image.add_symbol(name, addr);
    }
    Ok(())
}

fn parse_memory_section(image: &mut BinaryImage, body: &str) -> Result<(), String> {
    // Lines that continue right where the previous one ended are coalesced into one segment
    let mut pending: Option<(u64, Vec<u8>)> = None;
    for l in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut toks = l.split_whitespace();
        let start = toks
            .next()
            .map(parse_hex)
            .transpose()?
            .ok_or_else(|| format!("Expected address in line {:?}", l))?;
        let bytes = toks
            .map(|t| u8::from_str_radix(t, 16).map_err(|e| format!("{} in line {:?}", e, l)))
            .collect::<Result<Vec<u8>, String>>()?;
        match pending.take() {
            Some((pstart, mut pbytes))
                if pstart.checked_add(pbytes.len() as u64) == Some(start) =>
            {
                pbytes.extend(bytes);
                pending = Some((pstart, pbytes));
            }
            prev => {
                if let Some((pstart, pbytes)) = prev {
                    image.map_bytes(pstart, pbytes)?;
                }
                pending = Some((start, bytes));
            }
        }
    }
    if let Some((pstart, pbytes)) = pending {
        image.map_bytes(pstart, pbytes)?;
    }
    Ok(())
}

fn parse_value(tok: &str) -> Result<Expression, String> {
    let (value, size) = tok
        .rsplit_once('/')
        .ok_or_else(|| format!("Expected `/<size>` on value {:?}", tok))?;
    let size = size
        .parse()
        .map_err(|e| format!("Bad size on value {:?}: {}", tok, e))?;
    let value = match value.split_once(':') {
        None if value == "undetermined" => PossibleValue::Undetermined,
        Some(("const", v)) => PossibleValue::Constant(parse_hex(v)?),
        Some(("ptr", v)) => PossibleValue::ConstantPointer(parse_hex(v)?),
        Some(("extern", v)) => PossibleValue::ExternalPointer(parse_hex(v)?),
        _ => return Err(format!("Unknown value {:?}", tok)),
    };
    Ok(Expression { size, value })
}

fn parse_function_section(header: &str, body: &str) -> Result<Function, String> {
    let (entry, name) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| format!("Expected `FUNCTION <address> <name>`, got {:?}", header))?;
    let mut func = Function::new(name.trim(), parse_hex(entry)?);

    let mut block: Option<Vec<Instruction>> = None;
    for l in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if l == "BLOCK" {
            if let Some(b) = block.replace(vec![]) {
                func.add_basic_block(b)?;
            }
        } else if let Some(comment) = l.strip_prefix("COMMENT ") {
            let (addr, text) = comment.split_once(' ').unwrap_or((comment, ""));
            func.add_comment_to_machine_address(parse_hex(addr)?, text.trim());
        } else {
            let ins = parse_instruction_line(&mut func, l)
                .map_err(|e| format!("{} in line {:?}", e, l))?;
            block
                .as_mut()
                .ok_or_else(|| format!("Instruction before any BLOCK: {:?}", l))?
                .push(ins);
        }
    }
    if let Some(b) = block {
        func.add_basic_block(b)?;
    }
    trace!(
        "Lifted function";
        "name" => &func.name,
        "entry" => format_args!("{:#x}", func.entry_point),
        "instructions" => func.instructions.len(),
    );
    Ok(func)
}

fn parse_instruction_line(func: &mut Function, l: &str) -> Result<Instruction, String> {
    let mut toks = l.split_whitespace();
    let address = parse_hex(toks.next().ok_or("Missing address")?)?;
    let op = toks.next().ok_or("Missing operation")?;
    let operation = match op {
        "OTHER" => {
            if toks.next().is_some() {
                return Err("Unexpected operands for OTHER".into());
            }
            Operation::Other
        }
        "CALL" | "TAILCALL" => {
            let mut exprs = toks.map(|t| {
                let e = parse_value(t)?;
                Ok::<_, String>(func.add_expr(e.size, e.value))
            });
            let dest = exprs.next().ok_or("Missing call destination")??;
            let params = exprs.collect::<Result<Vec<_>, String>>()?;
            let ops = CallOperands { dest, params };
            if op == "CALL" {
                Operation::Call(ops)
            } else {
                Operation::TailCall(ops)
            }
        }
        _ => return Err(format!("Unknown operation {:?}", op)),
    };
    Ok(Instruction { address, operation })
}
