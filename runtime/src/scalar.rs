//! Abstracción sobre el tipo escalar de los registros.
//!
//! El intérprete no conoce el tipo concreto sobre el cual opera; cualquier
//! tipo que implemente [`Scalar`] puede poblar un archivo de registros.
//! Las implementaciones provistas son `f64` (el tipo natural del lenguaje
//! fuente) y `f32` (útil cuando la memoria del dispositivo es escasa).

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Celda de un archivo de registros.
pub trait Scalar:
    Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;

    /// Convierte una constante incrustada en el bytecode.
    fn from_f64(value: f64) -> Self;

    fn sqrt(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn powf(self, exponent: Self) -> Self;

    /// Verdad al estilo C: todo valor distinto de cero es verdadero.
    fn truthy(self) -> bool {
        self != Self::ZERO
    }

    /// Máscara `1.0`/`0.0` de un booleano.
    fn from_bool(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn sin(self) -> Self {
        f32::sin(self)
    }

    fn cos(self) -> Self {
        f32::cos(self)
    }

    fn exp(self) -> Self {
        f32::exp(self)
    }

    fn powf(self, exponent: Self) -> Self {
        f32::powf(self, exponent)
    }
}
