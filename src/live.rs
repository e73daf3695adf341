//! Análisis de vida y asignación de registros por barrido lineal.
//!
//! # Rangos de vida
//! Cada nombre escrito por la secuencia de instrucciones vive desde la
//! instrucción que lo define hasta su última lectura. Un nombre que se
//! reasigna produce un rango nuevo por cada escritura; la excepción es la
//! copia condicional, cuya escritura extiende el rango existente del
//! destino en vez de abrir uno nuevo, porque el valor anterior debe
//! sobrevivir para el camino falso de la guarda.
//!
//! Los extremos usan valores centinela: `written_at == -1` marca un
//! nombre definido por el invocador (parámetro de entrada),
//! `last_read_at == -2` marca un nombre que nunca se lee, y un rango de
//! salida termina en `N` (una posición después de la última instrucción)
//! para que su registro quede reservado hasta el final de la ejecución.
//!
//! # Barrido lineal
//! Los rangos, ordenados por inicio, se recorren una única vez. Los
//! rangos activos cuya última lectura ya pasó liberan su registro hacia
//! una pila de registros libres; un rango nuevo toma un registro de la
//! pila o estrena uno. No hay spills: el archivo de registros crece
//! según demanda y su tamaño final es el que el invocador debe reservar.

use crate::ir::NamedInstruction;

/// Centinela de inicio: el nombre lo define el invocador.
pub const DEFINED_BY_CALLER: i32 = -1;

/// Centinela de fin: el nombre nunca se lee.
pub const NEVER_READ: i32 = -2;

/// El lapso de instrucciones durante el cual un nombre debe permanecer
/// en un registro.
#[derive(Debug, Clone)]
pub struct LiveRange {
    pub name: String,
    pub written_at: i32,
    pub last_read_at: i32,
    pub register: i32,
}

/// Computa los rangos de vida de una secuencia de instrucciones,
/// ordenados por posición de escritura.
///
/// Los nombres presentes en `output_names` se mantienen vivos hasta una
/// posición después del final de la secuencia.
pub fn live_ranges(
    instructions: &[NamedInstruction],
    output_names: &[String],
) -> Vec<LiveRange> {
    let mut ranges: Vec<LiveRange> = Vec::new();

    for (position, instruction) in instructions.iter().enumerate() {
        if let Some(name) = instruction.left() {
            note_read(&mut ranges, position, name);
        }

        if let Some(name) = instruction.right() {
            note_read(&mut ranges, position, name);
        }

        // Una copia condicional sobre un destino ya vivo extiende el
        // rango existente en vez de abrir uno nuevo
        let extends_existing = instruction.is_conditional()
            && ranges.iter().any(|range| range.name == instruction.result());

        if extends_existing {
            continue;
        }

        let last_read_at = if output_names.iter().any(|output| output == instruction.result()) {
            instructions.len() as i32
        } else {
            NEVER_READ
        };

        ranges.push(LiveRange {
            name: instruction.result().to_string(),
            written_at: position as i32,
            last_read_at,
            register: -1,
        });
    }

    // Orden estable: los rangos de entrada conservan su orden de
    // primera lectura
    ranges.sort_by_key(|range| range.written_at);
    ranges
}

/// Registra la lectura de un nombre en una posición, extendiendo su
/// rango más reciente o creando un rango de entrada si no existe.
fn note_read(ranges: &mut Vec<LiveRange>, position: usize, name: &str) {
    let recent = ranges
        .iter()
        .enumerate()
        .filter(|(_, range)| range.name == name)
        .max_by_key(|(_, range)| range.written_at)
        .map(|(index, _)| index);

    match recent {
        Some(index) => ranges[index].last_read_at = position as i32,

        None => ranges.push(LiveRange {
            name: name.to_string(),
            written_at: DEFINED_BY_CALLER,
            last_read_at: position as i32,
            register: -1,
        }),
    }
}

/// Asigna un registro a cada rango mediante barrido lineal.
///
/// Retorna la cantidad de registros utilizados, que es la longitud
/// mínima del archivo de registros en ejecución.
pub fn assign_registers(
    ranges: &mut [LiveRange],
    instructions: &[NamedInstruction],
) -> usize {
    let mut active: Vec<usize> = Vec::new();
    let mut free: Vec<i32> = Vec::new();
    let mut register_count = 0;

    for current in 0..ranges.len() {
        let written_at = ranges[current].written_at;

        // Los operandos de una copia condicional que mueren en ella
        // siguen siendo parte del resultado del camino falso, por lo
        // cual no pueden ceder su registro al rango que nace ahí
        let conditional_birth = written_at >= 0
            && instructions
                .get(written_at as usize)
                .map_or(false, NamedInstruction::is_conditional);

        let mut index = 0;
        while index < active.len() {
            let last_read_at = ranges[active[index]].last_read_at;
            let keep = last_read_at > written_at
                || (conditional_birth && last_read_at == written_at);

            if keep {
                index += 1;
            } else {
                free.push(ranges[active[index]].register);
                active.remove(index);
            }
        }

        let register = free.pop().unwrap_or_else(|| {
            let fresh = register_count;
            register_count += 1;
            fresh
        });

        ranges[current].register = register;

        // `active` se mantiene ordenado por última lectura ascendente
        let last_read_at = ranges[current].last_read_at;
        let position =
            active.partition_point(|&range| ranges[range].last_read_at <= last_read_at);
        active.insert(position, current);
    }

    register_count as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;
    use crate::parse::{self, Lowered};
    use crate::source::{Location, Source};

    fn lower(text: &str) -> Lowered {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source, text).tokenize().expect("lexing failed");
        let eof = tokens
            .last()
            .map(|token| token.location().clone())
            .unwrap_or_else(|| Location::start_of(&source));

        parse::parse(tokens, eof).expect("parsing failed")
    }

    fn ranges_of(text: &str) -> (Lowered, Vec<LiveRange>, usize) {
        let lowered = lower(text);
        let mut ranges = live_ranges(&lowered.instructions, &lowered.output_names);
        let count = assign_registers(&mut ranges, &lowered.instructions);
        (lowered, ranges, count)
    }

    fn range<'a>(ranges: &'a [LiveRange], name: &str) -> &'a LiveRange {
        ranges
            .iter()
            .find(|range| range.name == name)
            .unwrap_or_else(|| panic!("no live range for {}", name))
    }

    /// Máximo de rangos simultáneamente vivos, contando cada posición
    /// con inicios recortados a cero y fines exclusivos. Solo es una
    /// igualdad exacta en programas sin copias condicionales.
    fn peak_overlap(ranges: &[LiveRange], instruction_count: usize) -> usize {
        (0..instruction_count as i32)
            .map(|position| {
                ranges
                    .iter()
                    .filter(|range| {
                        range.written_at.max(0) <= position && position < range.last_read_at
                    })
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn input_ranges_start_before_the_sequence() {
        let (_, ranges, _) =
            ranges_of("void f(double x, double& r) { r = x + 1; }");

        assert_eq!(range(&ranges, "x").written_at, DEFINED_BY_CALLER);
        assert_eq!(range(&ranges, "x").last_read_at, 1);
    }

    #[test]
    fn output_ranges_survive_to_the_end() {
        let (lowered, ranges, _) =
            ranges_of("void f(double x, double& r) { r = x + 1; }");

        let r = range(&ranges, "r");
        assert_eq!(r.written_at, 2);
        assert_eq!(r.last_read_at, lowered.instructions.len() as i32);
    }

    #[test]
    fn conditional_copy_extends_the_existing_range() {
        let (lowered, ranges, _) = ranges_of(
            "void f(double a, double b, double& r) { r = a; if (a < b) { r = b; } }",
        );

        // Una sola entrada para `r`, nacida en la copia incondicional
        let r: Vec<_> = ranges.iter().filter(|range| range.name == "r").collect();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].written_at, 0);
        assert_eq!(r[0].last_read_at, lowered.instructions.len() as i32);
    }

    #[test]
    fn reassignment_opens_a_new_range() {
        let (_, ranges, _) = ranges_of(
            "void f(double x, double& r) { double t = x; t = t + 1; r = t; }",
        );

        let t: Vec<_> = ranges.iter().filter(|range| range.name == "t").collect();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].written_at, 0);
        assert_eq!(t[0].last_read_at, 2);
        assert_eq!(t[1].written_at, 3);
        assert_eq!(t[1].last_read_at, 4);
    }

    #[test]
    fn registers_are_reused() {
        let (lowered, ranges, count) = ranges_of(
            "void f(double x, const double y, double const z, double& r) \
             { r = x*x + y*y + z*z; }",
        );

        assert_eq!(count, 3);
        assert_eq!(count, peak_overlap(&ranges, lowered.instructions.len()));
    }

    #[test]
    fn register_count_matches_peak_overlap() {
        let sources = [
            "void f(double x, double& r) { r = x + 1; }",
            "void f(const double in[2], double out[2]) { out[0] = in[0]; out[1] = in[1]; }",
            "void f(double x, double& r) { r = sqrt(x) + exp(x) * cos(x); }",
            "void f(double x, double& r) { double t = 5; r = x; }",
        ];

        for source in sources {
            let (lowered, ranges, count) = ranges_of(source);
            assert_eq!(
                count,
                peak_overlap(&ranges, lowered.instructions.len()),
                "peak overlap mismatch for {:?}",
                source
            );
        }
    }

    #[test]
    fn same_register_ranges_do_not_overlap() {
        let sources = [
            "void f(double x, const double y, double const z, double& r) \
             { r = x*x + y*y + z*z; }",
            "void f(double a, double b, double& r) \
             { r = a; if (a < b) { r = b; } else { r = a; } }",
            "void f(double x, double& r) { double t = x; t = t + 1; r = t; }",
        ];

        for source in sources {
            let lowered = lower(source);
            let mut ranges = live_ranges(&lowered.instructions, &lowered.output_names);
            let count = assign_registers(&mut ranges, &lowered.instructions);

            for register in 0..count as i32 {
                let mut sharers: Vec<_> = ranges
                    .iter()
                    .filter(|range| range.register == register)
                    .collect();
                sharers.sort_by_key(|range| range.written_at);

                for pair in sharers.windows(2) {
                    let conditional_birth = pair[1].written_at >= 0
                        && lowered.instructions[pair[1].written_at as usize].is_conditional();

                    // Reutilizar un registro exige que el rango anterior
                    // haya muerto; en un nacimiento condicional, que haya
                    // muerto estrictamente antes
                    if conditional_birth {
                        assert!(pair[0].last_read_at < pair[1].written_at, "{}", source);
                    } else {
                        assert!(pair[0].last_read_at <= pair[1].written_at, "{}", source);
                    }
                }
            }
        }
    }

    #[test]
    fn dying_operands_of_a_conditional_birth_keep_their_register() {
        // `b` se lee por última vez en la copia condicional que define a
        // `t`; su registro no puede ser el de `t`
        let (_, ranges, _) = ranges_of(
            "void f(double a, double b, double& r) \
             { r = a; if (a < b) { double t = b; r = t; } }",
        );

        assert_ne!(range(&ranges, "b").register, range(&ranges, "t").register);
    }
}
