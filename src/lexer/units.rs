//! Units sub-lexer: recognises a units
//! clause immediately following a numeric literal — single-word space/time
//! keywords (singular or plural), `unit^n`, and `/unit`.

use crate::ast::{SpaceScale, TimeScale, Units};

use super::cursor::Cursor;

#[derive(Clone, Copy)]
enum UnitWord {
    Space(SpaceScale),
    Time(TimeScale),
    Count,
}

fn keyword(word: &str) -> Option<UnitWord> {
    use SpaceScale::*;
    use TimeScale::*;
    Some(match word {
        "byte" | "bytes" => UnitWord::Space(Byte),
        "Kbyte" | "Kbytes" => UnitWord::Space(Kbyte),
        "Mbyte" | "Mbytes" => UnitWord::Space(Mbyte),
        "Gbyte" | "Gbytes" => UnitWord::Space(Gbyte),
        "Tbyte" | "Tbytes" => UnitWord::Space(Tbyte),
        "Pbyte" | "Pbytes" => UnitWord::Space(Pbyte),
        "Ebyte" | "Ebytes" => UnitWord::Space(Ebyte),
        "nsec" | "nsecs" => UnitWord::Time(Nsec),
        "usec" | "usecs" => UnitWord::Time(Usec),
        "msec" | "msecs" => UnitWord::Time(Msec),
        "sec" | "secs" => UnitWord::Time(Sec),
        "min" | "mins" => UnitWord::Time(Min),
        "hour" | "hours" => UnitWord::Time(Hour),
        "count" | "counts" => UnitWord::Count,
        _ => return None,
    })
}

fn scan_word(cursor: &mut Cursor) -> String {
    let mut buf = String::new();
    while let Some(c) = cursor.peek() {
        if c.is_ascii_alphabetic() {
            buf.push(c);
            cursor.bump();
        } else {
            break;
        }
    }
    buf
}

/// A single `[/]unit[^n]` factor.
struct Factor {
    word: UnitWord,
    exponent: i8,
}

fn scan_factor(cursor: &mut Cursor) -> Option<Factor> {
    let negate = if cursor.peek() == Some('/') {
        cursor.bump();
        true
    } else {
        false
    };
    let word_start_ok = cursor.peek().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    if !word_start_ok {
        return None;
    }
    let text = scan_word(cursor);
    let word = keyword(&text)?;
    let mut exponent: i8 = 1;
    if cursor.peek() == Some('^') {
        cursor.bump();
        let mut sign = 1i8;
        if cursor.peek() == Some('-') {
            sign = -1;
            cursor.bump();
        }
        let mut digits = String::new();
        while let Some(c) = cursor.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                cursor.bump();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return None;
        }
        exponent = sign * digits.parse::<i8>().unwrap_or(1);
    }
    if negate {
        exponent = -exponent;
    }
    Some(Factor { word, exponent })
}

/// Attempt to consume a units clause right after a numeric literal.
/// Returns `None` (leaving the cursor untouched) if no units clause starts
/// here at all, so the caller can fall back to a dimensionless literal.
pub(crate) fn scan_units(cursor: &mut Cursor) -> Option<Units> {
    let mut units = Units::NONE;
    let mut matched_any = false;
    loop {
        // snapshot by recording whether a separating space was consumed;
        // factors after the first may be separated by exactly one space.
        let before_space = matched_any;
        let mut consumed_space = false;
        if before_space {
            if cursor.peek() == Some(' ') {
                cursor.bump();
                consumed_space = true;
            } else {
                break;
            }
        }
        match scan_factor(cursor) {
            Some(factor) => {
                matched_any = true;
                apply_factor(&mut units, factor);
            }
            None => {
                // A consumed separating space with no unit word after it is
                // harmless: whitespace is skipped unconditionally by the
                // main lexer anyway, so there is nothing to put back.
                let _ = consumed_space;
                break;
            }
        }
    }
    if matched_any {
        Some(units)
    } else {
        None
    }
}

fn apply_factor(units: &mut Units, factor: Factor) {
    match factor.word {
        UnitWord::Space(scale) => {
            units.dim_space += factor.exponent;
            units.scale_space = scale;
        }
        UnitWord::Time(scale) => {
            units.dim_time += factor.exponent;
            units.scale_time = scale;
        }
        UnitWord::Count => {
            units.dim_count += factor.exponent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units_of(src: &str) -> Option<Units> {
        let mut c = Cursor::new(src);
        scan_units(&mut c)
    }

    #[test]
    fn plain_time_word() {
        let u = units_of("sec").unwrap();
        assert_eq!(u.dim_time, 1);
        assert_eq!(u.scale_time, TimeScale::Sec);
    }

    #[test]
    fn plural_space_word() {
        let u = units_of("Mbytes").unwrap();
        assert_eq!(u.dim_space, 1);
        assert_eq!(u.scale_space, SpaceScale::Mbyte);
    }

    #[test]
    fn exponent_and_negation() {
        let u = units_of("byte^2").unwrap();
        assert_eq!(u.dim_space, 2);
        let u = units_of("/sec").unwrap();
        assert_eq!(u.dim_time, -1);
    }

    #[test]
    fn no_match_returns_none() {
        assert!(units_of("+").is_none());
        assert!(units_of("").is_none());
    }
}
