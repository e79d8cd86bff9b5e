//! Turning one instruction line into bytecode parts.
//!
//! Instructions try their variants in order; the first variant whose operand parser accepts
//! the operands wins. Macros do the same, then substitute the matched operands into their
//! templates and assemble each resulting line as an ordinary instruction.
use super::instruction::{Instruction, Macro, Operation};
use super::operand_parser::MatchedOperandSet;
use super::AsmModel;
use crate::bytecode::AssembledInstruction;
use crate::error::{Error, ErrorKind};
use crate::memzone::MemoryZoneManager;
use crate::pathid::LineId;

/// Macros may expand to other macros, but not without bound.
const MAX_MACRO_DEPTH: usize = 16;

/// Assemble `text` (mnemonic followed by operands) into its parts.
pub fn parse_instruction(
    model: &AsmModel, line_id: &LineId, text: &str, zones: &MemoryZoneManager,
) -> Result<AssembledInstruction, Error> {
    parse_at_depth(model, line_id, text, zones, 0)
}

fn parse_at_depth(
    model: &AsmModel, line_id: &LineId, text: &str, zones: &MemoryZoneManager, depth: usize,
) -> Result<AssembledInstruction, Error> {
    let text = text.trim();
    let (mnemonic, operand_text) = match text.split_once(char::is_whitespace) {
        Some((m, rest)) => (m.to_lowercase(), rest.trim()),
        None => (text.to_lowercase(), ""),
    };
    let operands = split_operands(operand_text);
    match model.instructions.get(&mnemonic) {
        Some(Operation::Instruction(instruction)) => generate_instruction(model, instruction, line_id, &operands, zones),
        Some(Operation::Macro(mac)) => {
            if depth >= MAX_MACRO_DEPTH {
                return Err(syntax_err!(
                    line_id,
                    "macro \"{}\" exceeds the maximum expansion depth of {}",
                    mac.mnemonic,
                    MAX_MACRO_DEPTH
                ));
            }
            generate_macro(model, mac, line_id, &operands, zones, depth)
        }
        None => Err(syntax_err!(line_id, "Unrecognized mnemonic \"{}\"", mnemonic)),
    }
}

/// Split an operand list on commas that aren't inside brackets, braces, parentheses or quotes.
pub fn split_operands(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let mut operands = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') | (None, '{') => depth += 1,
            (None, ']') | (None, ')') | (None, '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                operands.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    operands.push(current.trim().to_string());
    operands
}

fn no_match(line_id: &LineId, mnemonic: &str) -> Error {
    line_err!(
        line_id,
        ErrorKind::Operand,
        "Instruction \"{}\" has no valid operands configured.",
        mnemonic
    )
}

fn generate_instruction(
    model: &AsmModel, instruction: &Instruction, line_id: &LineId, operands: &[String], zones: &MemoryZoneManager,
) -> Result<AssembledInstruction, Error> {
    for variant in &instruction.variants {
        let base = variant.bytecode.base_part(line_id);
        let suffix = variant.bytecode.suffix_part(line_id);
        let parts = match variant.operands.as_ref() {
            Some(parser) => match parser.find_matching_operands(line_id, operands, &model.registers, zones)? {
                Some(matched) => matched.generate_bytecode(Some(base), suffix),
                None => continue,
            },
            None if operands.is_empty() => {
                let mut parts = vec![base];
                parts.extend(suffix);
                parts
            }
            None => continue,
        };
        return Ok(AssembledInstruction::new(line_id, parts, model.word_size));
    }
    Err(no_match(line_id, &instruction.mnemonic))
}

fn generate_macro(
    model: &AsmModel, mac: &Macro, line_id: &LineId, operands: &[String], zones: &MemoryZoneManager, depth: usize,
) -> Result<AssembledInstruction, Error> {
    for variant in &mac.variants {
        let matched = match variant.operands.as_ref() {
            Some(parser) => match parser.find_matching_operands(line_id, operands, &model.registers, zones)? {
                Some(matched) => matched,
                None => continue,
            },
            None if operands.is_empty() => MatchedOperandSet::empty(),
            None => continue,
        };
        let mut steps = Vec::with_capacity(variant.instructions.len());
        for (step, template) in variant.instructions.iter().enumerate() {
            let expanded = expand_template(&mac.mnemonic, template, step, &matched, line_id)?;
            let step_id = line_id.in_macro(&mac.mnemonic, step);
            steps.push(parse_at_depth(model, &step_id, &expanded, zones, depth + 1)?);
        }
        return Ok(AssembledInstruction::composite(line_id, steps, model.word_size));
    }
    Err(no_match(line_id, &mac.mnemonic))
}

fn expand_template(
    mnemonic: &str, template: &str, step: usize, matched: &MatchedOperandSet, line_id: &LineId,
) -> Result<String, Error> {
    let mut line = template.to_string();
    for (n, op) in matched.operands.iter().enumerate() {
        let arg_tag = format!("@ARG({})", n);
        if line.contains(&arg_tag) {
            let arg = op.argument_string().ok_or_else(|| {
                syntax_err!(
                    line_id,
                    "macro \"{}\" step {} uses {} but that operand has no argument; consider @OP({})",
                    mnemonic,
                    step,
                    arg_tag,
                    n
                )
            })?;
            line = line.replace(&arg_tag, &arg);
        }
        let reg_tag = format!("@REG({})", n);
        if line.contains(&reg_tag) {
            let reg = op.register.as_deref().ok_or_else(|| {
                syntax_err!(
                    line_id,
                    "macro \"{}\" step {} uses {} but that operand has no register; consider @OP({})",
                    mnemonic,
                    step,
                    reg_tag,
                    n
                )
            })?;
            line = line.replace(&reg_tag, reg);
        }
        line = line.replace(&format!("@OP({})", n), &op.text);
    }
    for tag in ["@ARG", "@REG", "@OP"] {
        if line.contains(tag) {
            return Err(syntax_err!(
                line_id,
                "macro \"{}\" has an unresolved {} on step {}",
                mnemonic,
                tag,
                step
            ));
        }
    }
    Ok(line)
}
