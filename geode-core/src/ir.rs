//! In-memory SSA module and the builder used by lowering.
//!
//! Functions are lists of basic blocks; each block is a list of
//! instructions closed by at most one terminator. Values are either
//! constants or named registers (`%tN`). Stack slots are always placed at
//! the top of the entry block.

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Reg { id: u32, ty: Type },
    Param { index: u32, ty: Type },
    ConstInt { value: i64, ty: Type },
    ConstFloat { value: f64, ty: Type },
    /// Null of a pointer type.
    Null(Type),
    /// `zeroinitializer` of an aggregate type.
    Zero(Type),
    /// Address of a global; `ty` is a pointer to the global's content.
    Global { id: GlobalId, ty: Type },
    /// `i8*` to the first byte of a string constant of `len` bytes.
    StringPtr { id: GlobalId, len: u64 },
}

impl Value {
    pub fn int(value: i64, ty: Type) -> Self {
        Value::ConstInt { value, ty }
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Reg { ty, .. }
            | Value::Param { ty, .. }
            | Value::ConstInt { ty, .. }
            | Value::ConstFloat { ty, .. }
            | Value::Global { ty, .. } => ty.clone(),
            Value::Null(ty) | Value::Zero(ty) => ty.clone(),
            Value::StringPtr { .. } => Type::string(),
        }
    }

    /// Zero value of `ty`, used for default initialisation and synthesised
    /// returns.
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Int(_) => Value::int(0, ty.clone()),
            Type::Float | Type::Double => Value::ConstFloat {
                value: 0.0,
                ty: ty.clone(),
            },
            Type::Pointer(_) => Value::Null(ty.clone()),
            Type::Void | Type::Struct(_) | Type::Array(..) => Value::Zero(ty.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    Shl,
    AShr,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn opcode(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SExt,
    ZExt,
    Trunc,
    SIToFP,
    UIToFP,
    FPToSI,
    FPToUI,
    FPExt,
    FPTrunc,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

impl CastOp {
    pub fn opcode(self) -> &'static str {
        match self {
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::SIToFP => "sitofp",
            CastOp::UIToFP => "uitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::FPToUI => "fptoui",
            CastOp::FPExt => "fpext",
            CastOp::FPTrunc => "fptrunc",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca {
        dst: u32,
        ty: Type,
    },
    Load {
        dst: u32,
        ty: Type,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Binary {
        dst: u32,
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    FNeg {
        dst: u32,
        value: Value,
    },
    ICmp {
        dst: u32,
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    FCmp {
        dst: u32,
        pred: FloatPredicate,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        dst: u32,
        op: CastOp,
        value: Value,
        to: Type,
    },
    /// `getelementptr inbounds`; `ptr` points to `element`.
    Gep {
        dst: u32,
        element: Type,
        ptr: Value,
        indices: Vec<Value>,
    },
    Call {
        dst: Option<u32>,
        func: FuncId,
        args: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then: BlockId,
        otherwise: BlockId,
    },
    Ret(Option<Value>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then, otherwise, ..
            } => vec![*then, *otherwise],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn has_terminator(&self) -> bool {
        self.terminator.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Symbol name in the emitted module.
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub variadic: bool,
    /// Empty for declarations of external functions.
    pub blocks: Vec<BasicBlock>,
    next_reg: u32,
    entry_allocas: usize,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Null,
    Zero,
    Bytes(Vec<u8>),
    StringPtr { id: GlobalId, len: u64 },
    Struct(Vec<(Type, Constant)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    /// Type of the stored content.
    pub ty: Type,
    /// `None` for externally defined globals.
    pub init: Option<Constant>,
    /// Private, read-only data such as string literals.
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub target_triple: String,
    pub structs: Vec<StructDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }
}

/// Insertion point: a block inside a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub func: FuncId,
    pub block: BlockId,
}

/// Appends instructions at the current position.
///
/// The position must be set with `position_at_end` before emitting.
pub struct IrBuilder {
    module: Module,
    position: Position,
    strings: usize,
}

impl IrBuilder {
    pub fn new(name: impl Into<String>, target_triple: impl Into<String>) -> Self {
        IrBuilder {
            module: Module {
                name: name.into(),
                target_triple: target_triple.into(),
                structs: Vec::new(),
                globals: Vec::new(),
                functions: Vec::new(),
            },
            position: Position {
                func: FuncId(0),
                block: BlockId(0),
            },
            strings: 0,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    pub fn add_struct(&mut self, name: impl Into<String>, fields: Vec<Type>) {
        self.module.structs.push(StructDef {
            name: name.into(),
            fields,
        });
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(global);
        id
    }

    pub fn set_global_init(&mut self, id: GlobalId, init: Constant) {
        self.module.globals[id.0 as usize].init = Some(init);
    }

    /// Private NUL-terminated byte array holding `text`.
    pub fn string_constant(&mut self, text: &[u8]) -> (GlobalId, u64) {
        let mut bytes = text.to_vec();
        bytes.push(0);
        let len = bytes.len() as u64;
        let name = format!(".str.{}", self.strings);
        self.strings += 1;
        let id = self.add_global(Global {
            name,
            ty: Type::Array(Box::new(Type::I8), len),
            init: Some(Constant::Bytes(bytes)),
            constant: true,
        });
        (id, len)
    }

    pub fn string_literal(&mut self, text: &[u8]) -> Value {
        let (id, len) = self.string_constant(text);
        Value::StringPtr { id, len }
    }

    /// Add a function without blocks. Blocks appended later turn it into
    /// a definition.
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<Type>,
        ret: Type,
        variadic: bool,
    ) -> FuncId {
        let id = FuncId(self.module.functions.len() as u32);
        self.module.functions.push(Function {
            name: name.into(),
            params,
            ret,
            variadic,
            blocks: Vec::new(),
            next_reg: 0,
            entry_allocas: 0,
        });
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        self.module.function(id)
    }

    pub fn append_block(&mut self, func: FuncId, label: impl Into<String>) -> BlockId {
        let function = &mut self.module.functions[func.0 as usize];
        let id = BlockId(function.blocks.len() as u32);
        function.blocks.push(BasicBlock {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.position = Position { func, block };
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn current_function(&mut self) -> &mut Function {
        &mut self.module.functions[self.position.func.0 as usize]
    }

    fn current_block(&mut self) -> &mut BasicBlock {
        let block = self.position.block.0 as usize;
        &mut self.current_function().blocks[block]
    }

    /// Whether the current block is already closed.
    pub fn has_terminator(&self) -> bool {
        let function = self.module.function(self.position.func);
        function.block(self.position.block).has_terminator()
    }

    /// Whether any terminator in the current function branches to `block`.
    pub fn has_predecessors(&self, block: BlockId) -> bool {
        self.module
            .function(self.position.func)
            .blocks
            .iter()
            .filter_map(|b| b.terminator.as_ref())
            .any(|t| t.successors().contains(&block))
    }

    fn next_reg(&mut self) -> u32 {
        let function = self.current_function();
        let reg = function.next_reg;
        function.next_reg += 1;
        reg
    }

    fn emit(&mut self, instruction: Instruction) {
        let block = self.current_block();
        if block.has_terminator() {
            tracing::trace!("dropping instruction after terminator");
            return;
        }
        block.instructions.push(instruction);
    }

    /// Stack slot for `ty`, placed in the entry block of the current
    /// function regardless of the current position.
    pub fn alloca(&mut self, ty: Type) -> Value {
        let dst = self.next_reg();
        let function = self.current_function();
        let at = function.entry_allocas;
        function.entry_allocas += 1;
        function.blocks[0].instructions.insert(
            at,
            Instruction::Alloca {
                dst,
                ty: ty.clone(),
            },
        );
        Value::Reg {
            id: dst,
            ty: ty.pointer_to(),
        }
    }

    pub fn load(&mut self, ptr: Value) -> Value {
        let ty = ptr.ty().pointee().cloned().unwrap_or(Type::Void);
        let dst = self.next_reg();
        self.emit(Instruction::Load {
            dst,
            ty: ty.clone(),
            ptr,
        });
        Value::Reg { id: dst, ty }
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        self.emit(Instruction::Store { value, ptr });
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = lhs.ty();
        let dst = self.next_reg();
        self.emit(Instruction::Binary { dst, op, lhs, rhs });
        Value::Reg { id: dst, ty }
    }

    pub fn fneg(&mut self, value: Value) -> Value {
        let ty = value.ty();
        let dst = self.next_reg();
        self.emit(Instruction::FNeg { dst, value });
        Value::Reg { id: dst, ty }
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        let dst = self.next_reg();
        self.emit(Instruction::ICmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        Value::Reg {
            id: dst,
            ty: Type::BOOL,
        }
    }

    pub fn fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        let dst = self.next_reg();
        self.emit(Instruction::FCmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        Value::Reg {
            id: dst,
            ty: Type::BOOL,
        }
    }

    pub fn cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        let dst = self.next_reg();
        self.emit(Instruction::Cast {
            dst,
            op,
            value,
            to: to.clone(),
        });
        Value::Reg { id: dst, ty: to }
    }

    /// Address computation. `result` is the pointer type produced.
    pub fn gep(&mut self, ptr: Value, indices: Vec<Value>, result: Type) -> Value {
        let element = ptr.ty().pointee().cloned().unwrap_or(Type::Void);
        let dst = self.next_reg();
        self.emit(Instruction::Gep {
            dst,
            element,
            ptr,
            indices,
        });
        Value::Reg {
            id: dst,
            ty: result,
        }
    }

    /// Call `func`; returns `None` for void functions.
    pub fn call(&mut self, func: FuncId, args: Vec<Value>) -> Option<Value> {
        let ret = self.module.function(func).ret.clone();
        if ret.is_void() {
            self.emit(Instruction::Call {
                dst: None,
                func,
                args,
            });
            return None;
        }
        let dst = self.next_reg();
        self.emit(Instruction::Call {
            dst: Some(dst),
            func,
            args,
        });
        Some(Value::Reg { id: dst, ty: ret })
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.current_block();
        if block.has_terminator() {
            tracing::trace!("block already terminated");
            return;
        }
        block.terminator = Some(terminator);
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn cond_br(&mut self, cond: Value, then: BlockId, otherwise: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then,
            otherwise,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}
