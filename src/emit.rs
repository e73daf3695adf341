//! Materialización del bytecode final.
//!
//! Con los rangos de vida ya ligados a registros, cada instrucción
//! nombrada se traduce a su instrucción de bytecode sustituyendo nombres
//! por índices de registro, y se resuelven las tablas de la convención
//! de llamada.

use crate::{
    error::CompileError,
    ir::NamedInstruction,
    live::{LiveRange, DEFINED_BY_CALLER},
};
use runtime::{CompiledFunction, Instruction};

/// Construye la función compilada a partir de la secuencia nombrada y
/// sus rangos con registros asignados.
///
/// Falla con [`CompileError::MissingOutput`] si algún slot de salida
/// declarado no tiene un rango que sobreviva hasta el final.
pub fn emit(
    instructions: &[NamedInstruction],
    ranges: &[LiveRange],
    input_names: &[String],
    output_names: &[String],
    register_count: usize,
) -> Result<CompiledFunction, CompileError> {
    let length = instructions.len() as i32;

    let mut code: Vec<Instruction> = instructions
        .iter()
        .map(|instruction| Instruction {
            code: instruction.code(),
            result_register: 0,
            left: 0,
            right: 0,
            constant: instruction.constant().unwrap_or(0.0),
        })
        .collect();

    // Dentro del intervalo de un rango, ese rango es el único dueño de
    // su nombre, por lo cual la sustitución es directa. El intervalo
    // cubre siempre a la instrucción que define al rango, de modo que
    // hasta una escritura nunca leída quede ligada a su propio registro
    for range in ranges {
        let first = range.written_at.max(0);
        let last = (range.last_read_at + 1).clamp(range.written_at + 1, length);

        for position in first..last {
            let instruction = &instructions[position as usize];
            let target = &mut code[position as usize];

            if instruction.result() == range.name {
                target.result_register = range.register;
            }

            if instruction.left() == Some(range.name.as_str()) {
                target.left = range.register;
            }

            if instruction.right() == Some(range.name.as_str()) {
                target.right = range.register;
            }
        }
    }

    // Un slot de entrada sin rango es legal: el cuerpo nunca lo lee y
    // el valor del invocador se descarta
    let input_registers = input_names
        .iter()
        .map(|name| {
            ranges
                .iter()
                .find(|range| range.name == *name && range.written_at == DEFINED_BY_CALLER)
                .map_or(-1, |range| range.register)
        })
        .collect();

    // Cada reescritura incondicional de una salida abre un rango nuevo
    // que también termina en el final; el valor final vive en el más
    // joven de ellos
    let output_registers = output_names
        .iter()
        .map(|name| {
            ranges
                .iter()
                .rev()
                .find(|range| range.name == *name && range.last_read_at == length)
                .map(|range| range.register)
                .ok_or_else(|| CompileError::MissingOutput(name.clone()))
        })
        .collect::<Result<Vec<i32>, CompileError>>()?;

    Ok(CompiledFunction::new(
        code,
        input_registers,
        output_registers,
        register_count,
    ))
}
