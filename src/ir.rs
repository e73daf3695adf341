//! Representación intermedia de código.
//!
//! La representación intermedia es lineal y de tres direcciones: cada
//! instrucción nombra un resultado y hasta dos operandos. En esta etapa
//! los operandos todavía son nombres simbólicos (parámetros declarados,
//! entradas de arreglos como `x[2]`, o temporales `tmpK` inventados por
//! el parser); la asignación de registros los reemplaza después por
//! índices numéricos.
//!
//! # Propiedades de la secuencia
//! Todo nombre leído por una instrucción es un parámetro de entrada o fue
//! escrito por una instrucción anterior. No hay saltos: los condicionales
//! del lenguaje ya llegan reducidos a copias enmascaradas
//! ([`NamedInstruction::ConditionalCopy`]), cuyo destino conserva su
//! valor previo cuando la guarda es cero.

use runtime::OpCode;
use std::fmt::{self, Display};

/// Una instrucción en representación intermedia nombrada.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedInstruction {
    /// Copia incondicional de un nombre a otro.
    Copy { to: String, from: String },

    /// Copia que solo surte efecto si `condition` no es cero.
    ConditionalCopy {
        to: String,
        condition: String,
        value: String,
    },

    /// Escritura de una constante.
    Constant { to: String, value: f64 },

    /// Operación de un solo operando: negación, `!` lógico o una de las
    /// funciones integradas de un argumento.
    Unary {
        code: OpCode,
        to: String,
        operand: String,
    },

    /// Operación de dos operandos: aritmética, relacional, lógica o
    /// `pow`.
    Binary {
        code: OpCode,
        to: String,
        left: String,
        right: String,
    },
}

impl NamedInstruction {
    /// Obtiene el opcode de bytecode correspondiente.
    pub fn code(&self) -> OpCode {
        match self {
            NamedInstruction::Copy { .. } => OpCode::Copy,
            NamedInstruction::ConditionalCopy { .. } => OpCode::ConditionalCopy,
            NamedInstruction::Constant { .. } => OpCode::AssignConstant,
            NamedInstruction::Unary { code, .. } => *code,
            NamedInstruction::Binary { code, .. } => *code,
        }
    }

    /// Nombre que esta instrucción escribe.
    pub fn result(&self) -> &str {
        match self {
            NamedInstruction::Copy { to, .. } => to,
            NamedInstruction::ConditionalCopy { to, .. } => to,
            NamedInstruction::Constant { to, .. } => to,
            NamedInstruction::Unary { to, .. } => to,
            NamedInstruction::Binary { to, .. } => to,
        }
    }

    /// Nombre leído como operando izquierdo, si existe.
    ///
    /// Para una copia condicional el operando izquierdo es la guarda.
    pub fn left(&self) -> Option<&str> {
        match self {
            NamedInstruction::Copy { from, .. } => Some(from),
            NamedInstruction::ConditionalCopy { condition, .. } => Some(condition),
            NamedInstruction::Constant { .. } => None,
            NamedInstruction::Unary { operand, .. } => Some(operand),
            NamedInstruction::Binary { left, .. } => Some(left),
        }
    }

    /// Nombre leído como operando derecho, si existe.
    ///
    /// Para una copia condicional el operando derecho es el valor
    /// seleccionado por la guarda.
    pub fn right(&self) -> Option<&str> {
        match self {
            NamedInstruction::ConditionalCopy { value, .. } => Some(value),
            NamedInstruction::Binary { right, .. } => Some(right),
            _ => None,
        }
    }

    /// Constante incrustada, si la instrucción la tiene.
    pub fn constant(&self) -> Option<f64> {
        match self {
            NamedInstruction::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, NamedInstruction::ConditionalCopy { .. })
    }
}

impl Display for NamedInstruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NamedInstruction::*;

        match self {
            Copy { to, from } => write!(fmt, "{} = {}", to, from),

            ConditionalCopy {
                to,
                condition,
                value,
            } => write!(fmt, "if ({}) {} = {}", condition, to, value),

            Constant { to, value } => write!(fmt, "{} = {}", to, value),

            Unary { code, to, operand } => match code {
                OpCode::Negate => write!(fmt, "{} = -{}", to, operand),
                OpCode::LogicalNot => write!(fmt, "{} = !{}", to, operand),
                OpCode::Sqrt => write!(fmt, "{} = sqrt({})", to, operand),
                OpCode::Sin => write!(fmt, "{} = sin({})", to, operand),
                OpCode::Cos => write!(fmt, "{} = cos({})", to, operand),
                OpCode::Exp => write!(fmt, "{} = exp({})", to, operand),
                _ => write!(fmt, "{} = ?({})", to, operand),
            },

            Binary {
                code,
                to,
                left,
                right,
            } => match code {
                OpCode::Pow => write!(fmt, "{} = pow({}, {})", to, left, right),
                _ => write!(fmt, "{} = {} {} {}", to, left, operator(*code), right),
            },
        }
    }
}

/// Símbolo con el cual se imprime un opcode binario.
fn operator(code: OpCode) -> &'static str {
    match code {
        OpCode::Add => "+",
        OpCode::Subtract => "-",
        OpCode::Multiply => "*",
        OpCode::Divide => "/",
        OpCode::LogicalOr => "||",
        OpCode::LogicalAnd => "&&",
        OpCode::Equal => "==",
        OpCode::NotEqual => "!=",
        OpCode::Less => "<",
        OpCode::LessOrEqual => "<=",
        OpCode::Greater => ">",
        OpCode::GreaterOrEqual => ">=",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembly() {
        let add = NamedInstruction::Binary {
            code: OpCode::Add,
            to: "tmp2".into(),
            left: "x".into(),
            right: "tmp1".into(),
        };
        assert_eq!(add.to_string(), "tmp2 = x + tmp1");

        let guard = NamedInstruction::ConditionalCopy {
            to: "r".into(),
            condition: "tmp1".into(),
            value: "b".into(),
        };
        assert_eq!(guard.to_string(), "if (tmp1) r = b");

        let constant = NamedInstruction::Constant {
            to: "tmp1".into(),
            value: 2.5,
        };
        assert_eq!(constant.to_string(), "tmp1 = 2.5");
    }

    #[test]
    fn operand_accessors() {
        let guard = NamedInstruction::ConditionalCopy {
            to: "r".into(),
            condition: "c".into(),
            value: "v".into(),
        };

        assert_eq!(guard.code(), OpCode::ConditionalCopy);
        assert_eq!(guard.result(), "r");
        assert_eq!(guard.left(), Some("c"));
        assert_eq!(guard.right(), Some("v"));
        assert!(guard.is_conditional());
        assert_eq!(guard.constant(), None);
    }
}
