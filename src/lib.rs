//! Compilador en tiempo de ejecución para funciones matemáticas.
//!
//! Recibe la definición de una única función escrita en un lenguaje
//! numérico diminuto y la reduce a bytecode sobre registros, listo para
//! ejecutarse dentro de un lazo caliente con un costo cercano al de una
//! función escrita a mano. El recorrido completo es
//! [`lex`] → [`parse`] → análisis de vida y asignación de registros →
//! materialización del bytecode; el resultado es una
//! [`CompiledFunction`] del crate `runtime`.
//!
//! ```
//! let function = compiler::compile(
//!     "void density(const double x[3], double& rho) {
//!        rho = 1.0 + x[0];
//!      }",
//!     false,
//! )
//! .unwrap();
//!
//! let mut registers = vec![0.0f64; function.register_count()];
//! let mut rho = 0.0;
//!
//! function
//!     .executable()
//!     .call(&mut registers)
//!     .input_slice(&[4.0, 0.0, 0.0])
//!     .output(&mut rho)
//!     .run();
//!
//! assert_eq!(rho, 5.0);
//! ```

pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod source;

mod emit;
mod live;

pub use error::CompileError;
pub use runtime::{CompiledFunction, ExecutableFunction, Instruction, OpCode, Scalar, Vector3};

use crate::lex::Lexer;
use crate::source::{Location, Source};

/// Compila la definición de una función.
///
/// Con `verbose` activo se imprimen el listado de instrucciones
/// nombradas, los rangos de vida con sus registros, el bytecode final y
/// las tablas de entrada/salida.
pub fn compile(source_text: &str, verbose: bool) -> Result<CompiledFunction, CompileError> {
    let source = Source::new("runtime math function", source_text);

    let tokens = Lexer::new(&source, source_text).tokenize()?;
    let eof = tokens
        .last()
        .map(|token| token.location().clone())
        .unwrap_or_else(|| Location::start_of(&source));

    let lowered = parse::parse(tokens, eof)?;

    if verbose {
        for (position, instruction) in lowered.instructions.iter().enumerate() {
            println!("{}: {}", position, instruction);
        }
    }

    let mut ranges = live::live_ranges(&lowered.instructions, &lowered.output_names);
    let register_count = live::assign_registers(&mut ranges, &lowered.instructions);

    if verbose {
        for range in &ranges {
            println!(
                "{} at register {} from {} to {}",
                range.name, range.register, range.written_at, range.last_read_at
            );
        }
    }

    let function = emit::emit(
        &lowered.instructions,
        &ranges,
        &lowered.input_names,
        &lowered.output_names,
        register_count,
    )?;

    if verbose {
        for (position, instruction) in function.instructions().iter().enumerate() {
            println!("{}: {}", position, instruction);
        }

        for (name, register) in lowered.input_names.iter().zip(function.input_registers()) {
            println!("input variable {} at register {}", name, register);
        }

        for (name, register) in lowered.output_names.iter().zip(function.output_registers()) {
            println!("output variable {} at register {}", name, register);
        }
    }

    Ok(function)
}
