//! Textual LLVM IR for a lowered module.
//!
//! Output is deterministic: structs, globals and functions are printed in
//! creation order, registers are named `%tN` and parameters `%argN`.

use core::fmt::{self, Write};

use crate::ir::{
    BasicBlock, Constant, FloatPredicate, Function, Global, Instruction, IntPredicate, Module,
    Terminator, Value,
};
use crate::types::Type;

/// Render `module` as LLVM assembly.
pub fn generate_llvm_ir(module: &Module) -> String {
    LlvmText(module).to_string()
}

struct LlvmText<'m>(&'m Module);

impl fmt::Display for LlvmText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        writeln!(f, "; ModuleID = '{}'", module.name)?;
        writeln!(f, "source_filename = \"{}\"", module.name)?;
        writeln!(f, "target triple = \"{}\"", module.target_triple)?;

        if !module.structs.is_empty() {
            writeln!(f)?;
        }
        for def in &module.structs {
            let fields: Vec<String> = def.fields.iter().map(Type::to_string).collect();
            if fields.is_empty() {
                writeln!(f, "{} = type {{}}", Type::Struct(def.name.clone()))?;
            } else {
                writeln!(f, "{} = type {{ {} }}", Type::Struct(def.name.clone()), fields.join(", "))?;
            }
        }

        if !module.globals.is_empty() {
            writeln!(f)?;
        }
        for global in &module.globals {
            write_global(f, module, global)?;
        }

        for function in &module.functions {
            writeln!(f)?;
            write_function(f, module, function)?;
        }
        Ok(())
    }
}

fn write_global(f: &mut fmt::Formatter<'_>, module: &Module, global: &Global) -> fmt::Result {
    let name = symbol(&global.name);
    match &global.init {
        None => writeln!(f, "{name} = external global {}", global.ty),
        Some(init) => {
            let init = constant(module, &global.ty, init);
            if global.constant {
                writeln!(f, "{name} = private unnamed_addr constant {} {init}", global.ty)
            } else {
                writeln!(f, "{name} = global {} {init}", global.ty)
            }
        }
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, module: &Module, function: &Function) -> fmt::Result {
    let name = symbol(&function.name);
    if function.is_declaration() {
        let mut params: Vec<String> = function.params.iter().map(Type::to_string).collect();
        if function.variadic {
            params.push("...".to_string());
        }
        return writeln!(f, "declare {} {name}({})", function.ret, params.join(", "));
    }

    let mut params: Vec<String> = function
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{ty} %arg{i}"))
        .collect();
    if function.variadic {
        params.push("...".to_string());
    }
    writeln!(f, "define {} {name}({}) {{", function.ret, params.join(", "))?;
    for (i, block) in function.blocks.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        write_block(f, module, function, block)?;
    }
    writeln!(f, "}}")
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    module: &Module,
    function: &Function,
    block: &BasicBlock,
) -> fmt::Result {
    writeln!(f, "{}:", block.label)?;
    for instruction in &block.instructions {
        writeln!(f, "  {}", instruction_text(module, instruction))?;
    }
    match &block.terminator {
        Some(Terminator::Br(target)) => {
            writeln!(f, "  br label %{}", function.block(*target).label)
        }
        Some(Terminator::CondBr {
            cond,
            then,
            otherwise,
        }) => writeln!(
            f,
            "  br {}, label %{}, label %{}",
            typed(module, cond),
            function.block(*then).label,
            function.block(*otherwise).label
        ),
        Some(Terminator::Ret(Some(value))) => writeln!(f, "  ret {}", typed(module, value)),
        Some(Terminator::Ret(None)) => writeln!(f, "  ret void"),
        Some(Terminator::Unreachable) | None => writeln!(f, "  unreachable"),
    }
}

fn instruction_text(module: &Module, instruction: &Instruction) -> String {
    match instruction {
        Instruction::Alloca { dst, ty } => format!("%t{dst} = alloca {ty}"),
        Instruction::Load { dst, ty, ptr } => {
            format!("%t{dst} = load {ty}, {}", typed(module, ptr))
        }
        Instruction::Store { value, ptr } => {
            format!("store {}, {}", typed(module, value), typed(module, ptr))
        }
        Instruction::Binary { dst, op, lhs, rhs } => format!(
            "%t{dst} = {} {}, {}",
            op.opcode(),
            typed(module, lhs),
            operand(module, rhs)
        ),
        Instruction::FNeg { dst, value } => format!("%t{dst} = fneg {}", typed(module, value)),
        Instruction::ICmp {
            dst,
            pred,
            lhs,
            rhs,
        } => format!(
            "%t{dst} = icmp {} {}, {}",
            int_predicate(*pred),
            typed(module, lhs),
            operand(module, rhs)
        ),
        Instruction::FCmp {
            dst,
            pred,
            lhs,
            rhs,
        } => format!(
            "%t{dst} = fcmp {} {}, {}",
            float_predicate(*pred),
            typed(module, lhs),
            operand(module, rhs)
        ),
        Instruction::Cast { dst, op, value, to } => {
            format!("%t{dst} = {} {} to {to}", op.opcode(), typed(module, value))
        }
        Instruction::Gep {
            dst,
            element,
            ptr,
            indices,
        } => {
            let mut text = format!(
                "%t{dst} = getelementptr inbounds {element}, {}",
                typed(module, ptr)
            );
            for index in indices {
                let _ = write!(text, ", {}", typed(module, index));
            }
            text
        }
        Instruction::Call { dst, func, args } => {
            let callee = module.function(*func);
            let args: Vec<String> = args.iter().map(|arg| typed(module, arg)).collect();
            let target = if callee.variadic {
                let mut params: Vec<String> = callee.params.iter().map(Type::to_string).collect();
                params.push("...".to_string());
                format!("{} ({})", callee.ret, params.join(", "))
            } else {
                callee.ret.to_string()
            };
            let call = format!("call {target} {}({})", symbol(&callee.name), args.join(", "));
            match dst {
                Some(dst) => format!("%t{dst} = {call}"),
                None => call,
            }
        }
    }
}

fn typed(module: &Module, value: &Value) -> String {
    format!("{} {}", value.ty(), operand(module, value))
}

fn operand(module: &Module, value: &Value) -> String {
    match value {
        Value::Reg { id, .. } => format!("%t{id}"),
        Value::Param { index, .. } => format!("%arg{index}"),
        Value::ConstInt { value, ty } => int_literal(*value, ty),
        Value::ConstFloat { value, ty } => float_literal(*value, ty),
        Value::Null(_) => "null".to_string(),
        Value::Zero(_) => "zeroinitializer".to_string(),
        Value::Global { id, .. } => symbol(&module.global(*id).name),
        Value::StringPtr { id, len } => string_pointer(module, *id, *len),
    }
}

fn constant(module: &Module, ty: &Type, value: &Constant) -> String {
    match value {
        Constant::Int(value) => int_literal(*value, ty),
        Constant::Float(value) => float_literal(*value, ty),
        Constant::Null => "null".to_string(),
        Constant::Zero => match ty {
            Type::Int(_) => int_literal(0, ty),
            Type::Float | Type::Double => float_literal(0.0, ty),
            Type::Pointer(_) => "null".to_string(),
            _ => "zeroinitializer".to_string(),
        },
        Constant::Bytes(bytes) => byte_string(bytes),
        Constant::StringPtr { id, len } => string_pointer(module, *id, *len),
        Constant::Struct(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(ty, value)| format!("{ty} {}", constant(module, ty, value)))
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
    }
}

fn int_literal(value: i64, ty: &Type) -> String {
    if *ty == Type::BOOL {
        return if value & 1 == 1 { "true" } else { "false" }.to_string();
    }
    value.to_string()
}

/// Hex form is exact for both `float` and `double`.
fn float_literal(value: f64, ty: &Type) -> String {
    let value = if *ty == Type::Float {
        f64::from(value as f32)
    } else {
        value
    };
    format!("0x{:016X}", value.to_bits())
}

fn string_pointer(module: &Module, id: crate::ir::GlobalId, len: u64) -> String {
    let array = Type::Array(Box::new(Type::I8), len);
    format!(
        "getelementptr inbounds ({array}, {array}* {}, i64 0, i64 0)",
        symbol(&module.global(id).name)
    )
}

fn byte_string(bytes: &[u8]) -> String {
    let mut text = String::from("c\"");
    for &byte in bytes {
        if byte.is_ascii_graphic() && byte != b'"' && byte != b'\\' || byte == b' ' {
            text.push(byte as char);
        } else {
            let _ = write!(text, "\\{byte:02X}");
        }
    }
    text.push('"');
    text
}

/// `@name`, quoted when it contains characters LLVM identifiers cannot.
fn symbol(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '$' | '-'));
    if plain {
        format!("@{name}")
    } else {
        format!("@\"{name}\"")
    }
}

fn int_predicate(pred: IntPredicate) -> &'static str {
    match pred {
        IntPredicate::Eq => "eq",
        IntPredicate::Ne => "ne",
        IntPredicate::Slt => "slt",
        IntPredicate::Sle => "sle",
        IntPredicate::Sgt => "sgt",
        IntPredicate::Sge => "sge",
        IntPredicate::Ult => "ult",
        IntPredicate::Ule => "ule",
        IntPredicate::Ugt => "ugt",
        IntPredicate::Uge => "uge",
    }
}

fn float_predicate(pred: FloatPredicate) -> &'static str {
    match pred {
        FloatPredicate::Oeq => "oeq",
        FloatPredicate::One => "one",
        FloatPredicate::Olt => "olt",
        FloatPredicate::Ole => "ole",
        FloatPredicate::Ogt => "ogt",
        FloatPredicate::Oge => "oge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, IrBuilder};

    #[test]
    fn prints_definitions_and_declarations() {
        let mut builder = IrBuilder::new("demo", "x86_64-unknown-linux-gnu");
        let puts = builder.declare_function("puts", vec![Type::string()], Type::I32, false);
        let main = builder.declare_function("main", vec![], Type::I32, false);
        let entry = builder.append_block(main, "entry");
        builder.position_at_end(main, entry);
        let text = builder.string_literal(b"hi");
        builder.call(puts, vec![text]);
        let sum = builder.binary(BinOp::Add, Value::int(1, Type::I32), Value::int(2, Type::I32));
        builder.ret(Some(sum));

        let ir = generate_llvm_ir(&builder.finish());
        assert!(ir.contains("target triple = \"x86_64-unknown-linux-gnu\""));
        assert!(ir.contains("@.str.0 = private unnamed_addr constant [3 x i8] c\"hi\\00\""));
        assert!(ir.contains("declare i32 @puts(i8*)"));
        assert!(ir.contains("define i32 @main() {"));
        assert!(ir.contains(
            "call i32 @puts(i8* getelementptr inbounds ([3 x i8], [3 x i8]* @.str.0, i64 0, i64 0))"
        ));
        assert!(ir.contains("%t1 = add i32 1, 2"));
        assert!(ir.contains("ret i32 %t1"));
    }

    #[test]
    fn quotes_symbols_with_colons() {
        assert_eq!(symbol("main:counter"), "@\"main:counter\"");
        assert_eq!(symbol("_VM4mainN1f"), "@_VM4mainN1f");
    }

    #[test]
    fn floats_print_in_hex() {
        assert_eq!(float_literal(1.0, &Type::Double), "0x3FF0000000000000");
        assert_eq!(float_literal(0.1, &Type::Float), format!("0x{:016X}", f64::from(0.1f32).to_bits()));
    }

    #[test]
    fn variadic_calls_spell_the_signature() {
        let mut builder = IrBuilder::new("demo", "x86_64-unknown-linux-gnu");
        let printf = builder.declare_function("printf", vec![Type::string()], Type::I32, true);
        let main = builder.declare_function("main", vec![], Type::Void, false);
        let entry = builder.append_block(main, "entry");
        builder.position_at_end(main, entry);
        let fmt = builder.string_literal(b"%d\n");
        builder.call(printf, vec![fmt, Value::int(7, Type::I32)]);
        builder.ret(None);

        let ir = generate_llvm_ir(&builder.finish());
        assert!(ir.contains("declare i32 @printf(i8*, ...)"));
        assert!(ir.contains("%t0 = call i32 (i8*, ...) @printf("));
        assert!(ir.contains("c\"%d\\0A\\00\""));
        assert!(ir.contains("ret void"));
    }
}
