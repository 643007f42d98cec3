//! Macro-substitution engine (C4) and user-macro interpreter (C7).

pub mod gensym;
pub mod interpreter;
pub mod intrinsics;

pub use gensym::GensymGenerator;
pub use interpreter::{Interpreter, MacroInstr, StackElem};
pub use intrinsics::{
    compile_macro_body, register_builtin_control_macros, register_builtin_operators, register_builtin_throw, substitute,
    substitute_step, SubstitutionOutcome, BUILTIN_THROW_NAME,
};
