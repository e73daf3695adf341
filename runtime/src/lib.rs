//! Runtime de bytecode para funciones matemáticas compiladas.
//!
//! Este crate no sabe compilar: recibe programas ya reducidos a
//! instrucciones sobre registros numerados y los ejecuta. La separación
//! permite que el lado que ejecuta (posiblemente un dispositivo) no
//! arrastre el analizador ni el asignador de registros.

pub mod bytecode;
pub mod function;
pub mod scalar;
pub mod vector;

pub use bytecode::{Instruction, OpCode};
pub use function::{CallBuilder, CompiledFunction, ExecutableFunction};
pub use scalar::Scalar;
pub use vector::Vector3;
