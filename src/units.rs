use std::fmt;

use crate::value::format_number;

const BASE_SYMBOLS: [&str; 7] = ["kg", "m", "s", "A", "K", "mol", "cd"];

/// Exponents over the SI base units, in the order of `BASE_SYMBOLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension([i32; 7]);

impl Dimension {
    pub const NONE: Dimension = Dimension([0; 7]);
    pub const MASS: Dimension = Dimension([1, 0, 0, 0, 0, 0, 0]);
    pub const LENGTH: Dimension = Dimension([0, 1, 0, 0, 0, 0, 0]);
    pub const TIME: Dimension = Dimension([0, 0, 1, 0, 0, 0, 0]);
    pub const CURRENT: Dimension = Dimension([0, 0, 0, 1, 0, 0, 0]);
    pub const TEMPERATURE: Dimension = Dimension([0, 0, 0, 0, 1, 0, 0]);
    pub const AMOUNT: Dimension = Dimension([0, 0, 0, 0, 0, 1, 0]);
    pub const LUMINOSITY: Dimension = Dimension([0, 0, 0, 0, 0, 0, 1]);
    pub const AREA: Dimension = Dimension([0, 2, 0, 0, 0, 0, 0]);
    pub const VOLUME: Dimension = Dimension([0, 3, 0, 0, 0, 0, 0]);
    pub const FREQUENCY: Dimension = Dimension([0, 0, -1, 0, 0, 0, 0]);
    pub const SPEED: Dimension = Dimension([0, 1, -1, 0, 0, 0, 0]);
    pub const FORCE: Dimension = Dimension([1, 1, -2, 0, 0, 0, 0]);
    pub const ENERGY: Dimension = Dimension([1, 2, -2, 0, 0, 0, 0]);
    pub const POWER: Dimension = Dimension([1, 2, -3, 0, 0, 0, 0]);
    pub const PRESSURE: Dimension = Dimension([1, -1, -2, 0, 0, 0, 0]);
    pub const CHARGE: Dimension = Dimension([0, 0, 1, 1, 0, 0, 0]);
    pub const VOLTAGE: Dimension = Dimension([1, 2, -3, -1, 0, 0, 0]);

    pub fn checked_add(self, other: Dimension) -> Option<Dimension> {
        let mut out = self.0;
        for (slot, exp) in out.iter_mut().zip(other.0) {
            *slot = slot.checked_add(exp)?;
        }
        Some(Dimension(out))
    }

    pub fn checked_scale(self, factor: i32) -> Option<Dimension> {
        let mut out = self.0;
        for slot in out.iter_mut() {
            *slot = slot.checked_mul(factor)?;
        }
        Some(Dimension(out))
    }

    pub fn is_dimensionless(self) -> bool {
        self == Dimension::NONE
    }

    pub fn format(self) -> String {
        if self.is_dimensionless() {
            return "1".to_string();
        }
        let factors: Vec<(String, i32)> = BASE_SYMBOLS
            .iter()
            .zip(self.0)
            .map(|(symbol, exp)| (symbol.to_string(), exp))
            .collect();
        format_factors(&factors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitSpec {
    pub symbol: &'static str,
    pub dim: Dimension,
    pub scale: f64,
}

const fn spec(symbol: &'static str, dim: Dimension, scale: f64) -> UnitSpec {
    UnitSpec { symbol, dim, scale }
}

const UNITS: &[UnitSpec] = &[
    spec("m", Dimension::LENGTH, 1.0),
    spec("in", Dimension::LENGTH, 0.0254),
    spec("ft", Dimension::LENGTH, 0.3048),
    spec("yd", Dimension::LENGTH, 0.9144),
    spec("mi", Dimension::LENGTH, 1609.344),
    spec("nmi", Dimension::LENGTH, 1852.0),
    spec("g", Dimension::MASS, 0.001),
    spec("t", Dimension::MASS, 1000.0),
    spec("lb", Dimension::MASS, 0.453_592_37),
    spec("oz", Dimension::MASS, 0.028_349_523_125),
    spec("s", Dimension::TIME, 1.0),
    spec("min", Dimension::TIME, 60.0),
    spec("h", Dimension::TIME, 3600.0),
    spec("d", Dimension::TIME, 86_400.0),
    spec("wk", Dimension::TIME, 604_800.0),
    spec("yr", Dimension::TIME, 31_557_600.0),
    spec("A", Dimension::CURRENT, 1.0),
    spec("K", Dimension::TEMPERATURE, 1.0),
    spec("mol", Dimension::AMOUNT, 1.0),
    spec("cd", Dimension::LUMINOSITY, 1.0),
    spec("ha", Dimension::AREA, 10_000.0),
    spec("acre", Dimension::AREA, 4046.856_422_4),
    spec("L", Dimension::VOLUME, 0.001),
    spec("gal", Dimension::VOLUME, 0.003_785_411_784),
    spec("Hz", Dimension::FREQUENCY, 1.0),
    spec("mph", Dimension::SPEED, 0.447_04),
    spec("kn", Dimension::SPEED, 1852.0 / 3600.0),
    spec("N", Dimension::FORCE, 1.0),
    spec("lbf", Dimension::FORCE, 4.448_221_615_260_5),
    spec("J", Dimension::ENERGY, 1.0),
    spec("Wh", Dimension::ENERGY, 3600.0),
    spec("cal", Dimension::ENERGY, 4.184),
    spec("W", Dimension::POWER, 1.0),
    spec("hp", Dimension::POWER, 745.699_872),
    spec("Pa", Dimension::PRESSURE, 1.0),
    spec("bar", Dimension::PRESSURE, 100_000.0),
    spec("atm", Dimension::PRESSURE, 101_325.0),
    spec("psi", Dimension::PRESSURE, 6894.757_293_168),
    spec("C", Dimension::CHARGE, 1.0),
    spec("V", Dimension::VOLTAGE, 1.0),
];

/// Units that accept an SI prefix (`km`, `mg`, `kWh`, `mL`, ...).
const PREFIXABLE: &[&str] = &[
    "m", "g", "s", "A", "K", "mol", "cd", "L", "Hz", "N", "J", "Wh", "W", "Pa", "C", "V",
];

const PREFIXES: &[(&str, f64)] = &[
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
];

/// Looks up a single unit symbol, with optional SI prefix. The gram is the
/// named unit for mass, so `kg` resolves through the prefix table.
pub fn lookup(symbol: &str) -> Option<(f64, Dimension)> {
    if let Some(unit) = UNITS.iter().find(|unit| unit.symbol == symbol) {
        return Some((unit.scale, unit.dim));
    }
    for (prefix, factor) in PREFIXES {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            if rest.is_empty() || !PREFIXABLE.contains(&rest) {
                continue;
            }
            if let Some(unit) = UNITS.iter().find(|unit| unit.symbol == rest) {
                return Some((unit.scale * factor, unit.dim));
            }
        }
    }
    None
}

pub fn is_known_unit(symbol: &str) -> bool {
    lookup(symbol).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitError {
    Unknown(String),
    Malformed(String),
    DimensionMismatch { left: Dimension, right: Dimension },
    DivisionByZero,
    /// An exponent left the `i32` range.
    Overflow,
}

/// Parses a unit expression such as `kg*m/s^2`, `km/h` or `1/s` into
/// ordered `(symbol, exponent)` factors.
pub fn parse_unit_expr(text: &str) -> Result<Vec<(String, i32)>, UnitError> {
    let mut factors: Vec<(String, i32)> = Vec::new();
    let mut sign = 1;
    let mut pending = String::new();
    let flush = |pending: &mut String,
                 sign: i32,
                 factors: &mut Vec<(String, i32)>|
     -> Result<(), UnitError> {
        let term = pending.trim().to_string();
        pending.clear();
        if term.is_empty() {
            return Err(UnitError::Malformed(text.to_string()));
        }
        if term == "1" {
            return Ok(());
        }
        let (symbol, exp) = match term.split_once('^') {
            Some((symbol, exp)) => {
                let exp: i32 = exp
                    .trim()
                    .parse()
                    .map_err(|_| UnitError::Malformed(text.to_string()))?;
                (symbol.trim().to_string(), exp)
            }
            None => (term, 1),
        };
        if !is_known_unit(&symbol) {
            return Err(UnitError::Unknown(symbol));
        }
        push_factor(factors, &symbol, exp.checked_mul(sign).ok_or(UnitError::Overflow)?)
    };
    for ch in text.chars() {
        match ch {
            '*' | '·' => flush(&mut pending, sign, &mut factors)?,
            '/' => {
                flush(&mut pending, sign, &mut factors)?;
                sign = -1;
            }
            _ => pending.push(ch),
        }
    }
    flush(&mut pending, sign, &mut factors)?;
    Ok(factors)
}

fn push_factor(factors: &mut Vec<(String, i32)>, symbol: &str, exp: i32) -> Result<(), UnitError> {
    match factors.iter_mut().find(|(existing, _)| existing == symbol) {
        Some((_, total)) => *total = total.checked_add(exp).ok_or(UnitError::Overflow)?,
        None => factors.push((symbol.to_string(), exp)),
    }
    factors.retain(|(_, exp)| *exp != 0);
    Ok(())
}

fn factors_scale(factors: &[(String, i32)]) -> Result<(f64, Dimension), UnitError> {
    factors
        .iter()
        .try_fold((1.0, Dimension::NONE), |(scale, dim), (symbol, exp)| {
            let (unit_scale, unit_dim) = lookup(symbol).unwrap_or((1.0, Dimension::NONE));
            let dim = unit_dim
                .checked_scale(*exp)
                .and_then(|unit_dim| dim.checked_add(unit_dim))
                .ok_or(UnitError::Overflow)?;
            Ok((scale * unit_scale.powi(*exp), dim))
        })
}

fn format_factors(factors: &[(String, i32)]) -> String {
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for (symbol, exp) in factors {
        if *exp == 0 {
            continue;
        }
        let abs = exp.abs();
        let text = if abs == 1 {
            symbol.clone()
        } else {
            format!("{symbol}^{abs}")
        };
        if *exp > 0 {
            numerator.push(text);
        } else {
            denominator.push(text);
        }
    }
    let num = if numerator.is_empty() {
        "1".to_string()
    } else {
        numerator.join("*")
    };
    if denominator.is_empty() {
        num
    } else {
        format!("{num}/{}", denominator.join("*"))
    }
}

/// A scalar with physical units, kept both in SI-normalised form and in the
/// units it was written with.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    si_value: f64,
    dim: Dimension,
    value: f64,
    units: Vec<(String, i32)>,
}

impl Measurement {
    pub fn dimensionless(value: f64) -> Self {
        Self {
            si_value: value,
            dim: Dimension::NONE,
            value,
            units: Vec::new(),
        }
    }

    pub fn from_unit(value: f64, unit: &str) -> Result<Self, UnitError> {
        let units = parse_unit_expr(unit)?;
        let (scale, dim) = factors_scale(&units)?;
        Ok(Self {
            si_value: value * scale,
            dim,
            value,
            units,
        })
    }

    fn from_si(si_value: f64, dim: Dimension, units: Vec<(String, i32)>) -> Result<Self, UnitError> {
        let (scale, _) = factors_scale(&units)?;
        Ok(Self {
            si_value,
            dim,
            value: si_value / scale,
            units,
        })
    }

    pub fn si_value(&self) -> f64 {
        self.si_value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn dim(&self) -> Dimension {
        self.dim
    }

    pub fn unit_text(&self) -> String {
        if self.units.is_empty() {
            String::new()
        } else {
            format_factors(&self.units)
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dim.is_dimensionless()
    }

    pub fn as_whole_days(&self) -> Option<i64> {
        if self.dim != Dimension::TIME {
            return None;
        }
        let days = self.si_value / 86_400.0;
        crate::value::is_integral(days).then(|| days.round() as i64)
    }

    pub fn add(&self, other: &Measurement) -> Result<Measurement, UnitError> {
        self.same_dimension(other)?;
        Self::from_si(
            self.si_value + other.si_value,
            self.dim,
            self.display_units(other),
        )
    }

    pub fn sub(&self, other: &Measurement) -> Result<Measurement, UnitError> {
        self.same_dimension(other)?;
        Self::from_si(
            self.si_value - other.si_value,
            self.dim,
            self.display_units(other),
        )
    }

    pub fn mul(&self, other: &Measurement) -> Result<Measurement, UnitError> {
        let mut units = self.units.clone();
        for (symbol, exp) in &other.units {
            push_factor(&mut units, symbol, *exp)?;
        }
        let dim = self.dim.checked_add(other.dim).ok_or(UnitError::Overflow)?;
        Self::from_si(self.si_value * other.si_value, dim, units)
    }

    pub fn div(&self, other: &Measurement) -> Result<Measurement, UnitError> {
        if other.si_value == 0.0 {
            return Err(UnitError::DivisionByZero);
        }
        let mut units = self.units.clone();
        for (symbol, exp) in &other.units {
            push_factor(&mut units, symbol, exp.checked_neg().ok_or(UnitError::Overflow)?)?;
        }
        let dim = other
            .dim
            .checked_scale(-1)
            .and_then(|inverse| self.dim.checked_add(inverse))
            .ok_or(UnitError::Overflow)?;
        Self::from_si(self.si_value / other.si_value, dim, units)
    }

    pub fn scale(&self, factor: f64) -> Measurement {
        Self {
            si_value: self.si_value * factor,
            dim: self.dim,
            value: self.value * factor,
            units: self.units.clone(),
        }
    }

    /// Integer power. Fails when a unit exponent leaves the `i32` range.
    pub fn powi(&self, exp: i32) -> Result<Measurement, UnitError> {
        let units = self
            .units
            .iter()
            .map(|(symbol, e)| Some((symbol.clone(), e.checked_mul(exp)?)))
            .collect::<Option<Vec<_>>>()
            .ok_or(UnitError::Overflow)?;
        let dim = self.dim.checked_scale(exp).ok_or(UnitError::Overflow)?;
        Self::from_si(self.si_value.powi(exp), dim, units)
    }

    /// Re-expresses the measurement in other units of the same dimension.
    pub fn convert(&self, unit: &str) -> Result<Measurement, UnitError> {
        let units = parse_unit_expr(unit)?;
        let (_, dim) = factors_scale(&units)?;
        if dim != self.dim {
            return Err(UnitError::DimensionMismatch {
                left: self.dim,
                right: dim,
            });
        }
        Self::from_si(self.si_value, self.dim, units)
    }

    pub fn approx_eq(&self, other: &Measurement) -> bool {
        let tolerance = 1e-8 * self.si_value.abs().max(other.si_value.abs()).max(1.0);
        self.dim == other.dim && (self.si_value - other.si_value).abs() <= tolerance
    }

    fn same_dimension(&self, other: &Measurement) -> Result<(), UnitError> {
        if self.dim != other.dim {
            return Err(UnitError::DimensionMismatch {
                left: self.dim,
                right: other.dim,
            });
        }
        Ok(())
    }

    fn display_units(&self, other: &Measurement) -> Vec<(String, i32)> {
        if self.units.is_empty() {
            other.units.clone()
        } else {
            self.units.clone()
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.units.is_empty() {
            write!(f, "{}", format_number(self.value))
        } else {
            write!(f, "{} {}", format_number(self.value), self.unit_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_units_resolve() {
        let (scale, dim) = lookup("km").expect("km");
        assert_eq!(scale, 1000.0);
        assert_eq!(dim, Dimension::LENGTH);
        let (scale, dim) = lookup("kg").expect("kg");
        assert!((scale - 1.0).abs() < 1e-12);
        assert_eq!(dim, Dimension::MASS);
        assert!(lookup("kft").is_none());
    }

    #[test]
    fn compound_expression_has_force_dimension() {
        let m = Measurement::from_unit(2.0, "kg*m/s^2").expect("parses");
        assert_eq!(m.dim(), Dimension::FORCE);
        assert_eq!(m.unit_text(), "kg*m/s^2");
    }

    #[test]
    fn add_keeps_left_units() {
        let a = Measurement::from_unit(1.0, "km").expect("km");
        let b = Measurement::from_unit(500.0, "m").expect("m");
        let sum = a.add(&b).expect("same dimension");
        assert!((sum.value() - 1.5).abs() < 1e-12);
        assert_eq!(sum.unit_text(), "km");
    }

    #[test]
    fn add_rejects_mismatched_dimensions() {
        let a = Measurement::from_unit(1.0, "m").expect("m");
        let b = Measurement::from_unit(1.0, "s").expect("s");
        assert!(matches!(
            a.add(&b),
            Err(UnitError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn conversion_round_trips() {
        let speed = Measurement::from_unit(72.0, "km/h").expect("km/h");
        let ms = speed.convert("m/s").expect("compatible");
        assert!((ms.value() - 20.0).abs() < 1e-9);
        let back = ms.convert("km/h").expect("compatible");
        assert!((back.value() - 72.0).abs() < 1e-9);
        assert!(speed.convert("kg").is_err());
    }

    #[test]
    fn division_cancels_units() {
        let distance = Measurement::from_unit(100.0, "m").expect("m");
        let time = Measurement::from_unit(10.0, "s").expect("s");
        let speed = distance.div(&time).expect("non-zero");
        assert_eq!(speed.dim(), Dimension::SPEED);
        assert_eq!(speed.unit_text(), "m/s");
        let ratio = distance.div(&distance).expect("non-zero");
        assert!(ratio.is_dimensionless());
    }

    #[test]
    fn exponent_overflow_is_an_error() {
        let area = Measurement::from_unit(2.0, "m^2").expect("m^2");
        assert_eq!(area.powi(2_000_000_000), Err(UnitError::Overflow));
        assert!(area.powi(3).is_ok());
        let big = Measurement::from_unit(1.0, "m^2000000000").expect("fits i32");
        assert_eq!(big.mul(&big), Err(UnitError::Overflow));
        assert_eq!(Dimension::LENGTH.checked_scale(i32::MAX), Some(Dimension([0, i32::MAX, 0, 0, 0, 0, 0])));
        assert_eq!(Dimension::FORCE.checked_scale(i32::MAX), None);
    }

    #[test]
    fn unknown_symbol_is_reported() {
        assert_eq!(
            parse_unit_expr("furlong"),
            Err(UnitError::Unknown("furlong".into()))
        );
    }
}
