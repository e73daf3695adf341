//! Contenedor de funciones compiladas y convención de llamada.
//!
//! Una [`CompiledFunction`] es dueña de sus buffers: el listado de
//! instrucciones y las tablas de registros de entrada y salida. Clonarla
//! copia los buffers en bloque, que es exactamente la operación necesaria
//! para alojar una réplica en otra memoria.
//!
//! La ejecución no ocurre sobre el contenedor sino sobre una
//! [`ExecutableFunction`], una vista sin ownership válida mientras viva la
//! función que la produjo. Esto permite que un mismo programa compilado se
//! invoque desde varios hilos a la vez, siempre que cada invocación aporte
//! su propio archivo de registros.
//!
//! # Convención de llamada
//! Cada parámetro declarado aporta slots escalares en orden de
//! declaración: uno por escalar, uno por elemento de arreglo, tres por
//! vector. `input_registers[i]` indica en cuál registro debe escribirse el
//! i-ésimo slot de entrada antes de ejecutar (`-1` si el cuerpo nunca lo
//! lee y el valor se descarta). `output_registers[i]` indica de cuál
//! registro se lee el i-ésimo slot de salida al terminar; la compilación
//! garantiza que nunca es negativo.

use crate::bytecode::Instruction;
use crate::scalar::Scalar;
use crate::vector::Vector3;

/// Un programa compilado, con ownership de sus buffers.
#[derive(Clone, Debug)]
pub struct CompiledFunction {
    instructions: Vec<Instruction>,
    input_registers: Vec<i32>,
    output_registers: Vec<i32>,
    register_count: usize,
}

impl CompiledFunction {
    pub fn new(
        instructions: Vec<Instruction>,
        input_registers: Vec<i32>,
        output_registers: Vec<i32>,
        register_count: usize,
    ) -> Self {
        CompiledFunction {
            instructions,
            input_registers,
            output_registers,
            register_count,
        }
    }

    /// Obtiene una vista ejecutable de este programa.
    pub fn executable(&self) -> ExecutableFunction<'_> {
        ExecutableFunction {
            instructions: &self.instructions,
            input_registers: &self.input_registers,
            output_registers: &self.output_registers,
            register_count: self.register_count,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn input_registers(&self) -> &[i32] {
        &self.input_registers
    }

    pub fn output_registers(&self) -> &[i32] {
        &self.output_registers
    }

    /// Longitud mínima del archivo de registros que requiere la ejecución.
    pub fn register_count(&self) -> usize {
        self.register_count
    }
}

/// Vista sin ownership sobre una [`CompiledFunction`].
#[derive(Copy, Clone)]
pub struct ExecutableFunction<'a> {
    instructions: &'a [Instruction],
    input_registers: &'a [i32],
    output_registers: &'a [i32],
    register_count: usize,
}

impl<'a> ExecutableFunction<'a> {
    /// Ejecuta el programa sobre un archivo de registros ya poblado.
    ///
    /// El invocador es responsable de que `registers` tenga al menos
    /// [`ExecutableFunction::register_count`] celdas.
    pub fn execute<S: Scalar>(&self, registers: &mut [S]) {
        debug_assert!(registers.len() >= self.register_count);

        for instruction in self.instructions {
            instruction.execute(registers);
        }
    }

    /// Comienza una invocación con argumentos tipados.
    ///
    /// Los argumentos se agregan en orden de declaración con los métodos
    /// `input*` y `output*` de [`CallBuilder`] y la ejecución ocurre al
    /// llamar [`CallBuilder::run`].
    pub fn call<'r, 'o, S: Scalar>(
        self,
        registers: &'r mut [S],
    ) -> CallBuilder<'a, 'r, 'o, S> {
        CallBuilder {
            function: self,
            registers,
            input_slot: 0,
            outputs: Vec::new(),
        }
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }
}

/// Destino pendiente de un slot de salida.
enum Output<'o, S> {
    Scalar(&'o mut S),
    Slice(&'o mut [S]),
    Vector(&'o mut Vector3<S>),
}

/// Invocación en construcción sobre una [`ExecutableFunction`].
///
/// Los argumentos de entrada se escriben de inmediato en sus registros;
/// los de salida quedan registrados y se resuelven después de ejecutar.
pub struct CallBuilder<'a, 'r, 'o, S: Scalar> {
    function: ExecutableFunction<'a>,
    registers: &'r mut [S],
    input_slot: usize,
    outputs: Vec<Output<'o, S>>,
}

impl<'a, 'r, 'o, S: Scalar> CallBuilder<'a, 'r, 'o, S> {
    /// Aporta un escalar de entrada.
    pub fn input(mut self, value: S) -> Self {
        self.feed(value);
        self
    }

    /// Aporta un arreglo de entrada, un slot por elemento.
    pub fn input_slice(mut self, values: &[S]) -> Self {
        for &value in values {
            self.feed(value);
        }

        self
    }

    /// Aporta un vector de entrada, en orden `x`, `y`, `z`.
    pub fn input_vector(mut self, value: &Vector3<S>) -> Self {
        self.feed(value.x);
        self.feed(value.y);
        self.feed(value.z);
        self
    }

    /// Asocia el siguiente slot de salida a un escalar.
    pub fn output(mut self, target: &'o mut S) -> Self {
        self.outputs.push(Output::Scalar(target));
        self
    }

    /// Asocia un slot de salida por cada elemento de un arreglo.
    pub fn output_slice(mut self, target: &'o mut [S]) -> Self {
        self.outputs.push(Output::Slice(target));
        self
    }

    /// Asocia tres slots de salida a las componentes de un vector.
    pub fn output_vector(mut self, target: &'o mut Vector3<S>) -> Self {
        self.outputs.push(Output::Vector(target));
        self
    }

    /// Ejecuta y vuelca los slots de salida en sus destinos.
    pub fn run(self) {
        let CallBuilder {
            function,
            registers,
            outputs,
            ..
        } = self;

        function.execute(registers);

        let mut slot = 0;
        for output in outputs {
            match output {
                Output::Scalar(target) => {
                    *target = registers[function.output_registers[slot] as usize];
                    slot += 1;
                }

                Output::Slice(target) => {
                    for cell in target.iter_mut() {
                        *cell = registers[function.output_registers[slot] as usize];
                        slot += 1;
                    }
                }

                Output::Vector(target) => {
                    target.x = registers[function.output_registers[slot] as usize];
                    target.y = registers[function.output_registers[slot + 1] as usize];
                    target.z = registers[function.output_registers[slot + 2] as usize];
                    slot += 3;
                }
            }
        }
    }

    fn feed(&mut self, value: S) {
        let register = self.function.input_registers[self.input_slot];
        self.input_slot += 1;

        // Un slot en -1 es legal: el cuerpo nunca lee ese parámetro
        if register >= 0 {
            self.registers[register as usize] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OpCode;

    /// `out = a + b`, con `a` en $0, `b` en $1 y `out` en $2.
    fn sum_function() -> CompiledFunction {
        let add = Instruction {
            code: OpCode::Add,
            result_register: 2,
            left: 0,
            right: 1,
            constant: 0.0,
        };

        CompiledFunction::new(vec![add], vec![0, 1], vec![2], 3)
    }

    #[test]
    fn scalar_round_trip() {
        let function = sum_function();
        let mut registers = [0.0f64; 3];
        let mut result = 0.0;

        function
            .executable()
            .call(&mut registers)
            .input(2.0)
            .input(3.5)
            .output(&mut result)
            .run();

        assert_eq!(result, 5.5);
    }

    #[test]
    fn unused_input_slot_is_discarded() {
        let function = CompiledFunction::new(
            vec![Instruction {
                code: OpCode::Copy,
                result_register: 1,
                left: 0,
                right: 0,
                constant: 0.0,
            }],
            vec![0, -1],
            vec![1],
            2,
        );

        let mut registers = [0.0f64; 2];
        let mut result = 0.0;

        function
            .executable()
            .call(&mut registers)
            .input(8.0)
            .input(123.0)
            .output(&mut result)
            .run();

        assert_eq!(result, 8.0);
    }

    #[test]
    fn slice_and_vector_arguments() {
        // Dos entradas y tres salidas: out = {a[1], a[0], a[0]}
        let instructions = vec![
            Instruction {
                code: OpCode::Copy,
                result_register: 2,
                left: 1,
                right: 0,
                constant: 0.0,
            },
            Instruction {
                code: OpCode::Copy,
                result_register: 3,
                left: 0,
                right: 0,
                constant: 0.0,
            },
        ];

        let function = CompiledFunction::new(instructions, vec![0, 1], vec![2, 3, 0], 4);

        let mut registers = [0.0f64; 4];
        let mut out = Vector3::default();

        function
            .executable()
            .call(&mut registers)
            .input_slice(&[1.5, 2.5])
            .output_vector(&mut out)
            .run();

        assert_eq!((out.x, out.y, out.z), (2.5, 1.5, 1.5));
    }

    #[test]
    fn bulk_copy_preserves_behavior() {
        let host = sum_function();
        let device = host.clone();

        assert_eq!(host.instructions().len(), device.instructions().len());
        assert_eq!(host.register_count(), device.register_count());

        let mut registers = [0.0f64; 3];
        let mut result = 0.0;

        device
            .executable()
            .call(&mut registers)
            .input(1.0)
            .input(2.0)
            .output(&mut result)
            .run();

        assert_eq!(result, 3.0);
    }
}
