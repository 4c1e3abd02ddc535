//! Post-solve activity modification operators.

use songhelix_spec::arrangement::{ActivityModifierSpec, SectionRef};

use crate::activity::{ActivityMatrix, ActivityVector};
use crate::error::EngineError;
use crate::harmony::Harmony;

/// Apply the configured operators in order.
pub(super) fn apply_modifiers(
    matrix: &mut ActivityMatrix,
    modifiers: &[ActivityModifierSpec],
    harmony: &Harmony,
) -> Result<(), EngineError> {
    for modifier in modifiers {
        let (from, to) = range_of(modifier, harmony)?;
        let (from_tick, _) = harmony.section_range(from);
        let (_, till_tick) = harmony.section_range(to);
        match modifier {
            ActivityModifierSpec::Set { target, .. } => {
                lookup_mut(matrix, target)?.set_range(from_tick, till_tick, true);
            }
            ActivityModifierSpec::Clear { target, .. } => {
                lookup_mut(matrix, target)?.set_range(from_tick, till_tick, false);
            }
            ActivityModifierSpec::Flip { target, .. } => {
                lookup_mut(matrix, target)?.flip_range(from_tick, till_tick);
            }
            ActivityModifierSpec::Not { target, a, .. } => {
                let a = lookup(matrix, a)?.clone();
                lookup_mut(matrix, target)?.apply_not(&a, from_tick, till_tick);
            }
            ActivityModifierSpec::And { target, a, b, .. } => {
                binary(matrix, target, a, b, from_tick, till_tick, |a, b| a && b)?;
            }
            ActivityModifierSpec::Or { target, a, b, .. } => {
                binary(matrix, target, a, b, from_tick, till_tick, |a, b| a || b)?;
            }
            ActivityModifierSpec::Xor { target, a, b, .. } => {
                binary(matrix, target, a, b, from_tick, till_tick, |a, b| a != b)?;
            }
            ActivityModifierSpec::AndNot { target, a, b, .. } => {
                binary(matrix, target, a, b, from_tick, till_tick, |a, b| a && !b)?;
            }
        }
    }
    Ok(())
}

fn binary(
    matrix: &mut ActivityMatrix,
    target: &str,
    a: &str,
    b: &str,
    from_tick: usize,
    till_tick: usize,
    op: impl Fn(bool, bool) -> bool,
) -> Result<(), EngineError> {
    let a = lookup(matrix, a)?.clone();
    let b = lookup(matrix, b)?.clone();
    let target = lookup_mut(matrix, target)?;
    for tick in from_tick..till_tick.min(target.len()) {
        let value = op(a.is_active(tick), b.is_active(tick));
        target.set_range(tick, tick + 1, value);
    }
    Ok(())
}

fn lookup<'m>(matrix: &'m ActivityMatrix, name: &str) -> Result<&'m ActivityVector, EngineError> {
    matrix.get(name).ok_or_else(|| EngineError::UnknownActivityVector {
        name: name.to_string(),
    })
}

fn lookup_mut<'m>(
    matrix: &'m mut ActivityMatrix,
    name: &str,
) -> Result<&'m mut ActivityVector, EngineError> {
    matrix
        .get_mut(name)
        .ok_or_else(|| EngineError::UnknownActivityVector {
            name: name.to_string(),
        })
}

fn range_of(
    modifier: &ActivityModifierSpec,
    harmony: &Harmony,
) -> Result<(usize, usize), EngineError> {
    let (from, to) = match modifier {
        ActivityModifierSpec::Set { from, to, .. }
        | ActivityModifierSpec::Clear { from, to, .. }
        | ActivityModifierSpec::Flip { from, to, .. }
        | ActivityModifierSpec::Not { from, to, .. }
        | ActivityModifierSpec::And { from, to, .. }
        | ActivityModifierSpec::Or { from, to, .. }
        | ActivityModifierSpec::Xor { from, to, .. }
        | ActivityModifierSpec::AndNot { from, to, .. } => (from, to),
    };
    let from = resolve_section(from, harmony)?;
    let to = resolve_section(to, harmony)?;
    if from > to {
        return Err(EngineError::SequencerConfig {
            message: format!("modifier section range {}..{} is reversed", from, to),
        });
    }
    Ok((from, to))
}

/// Resolve a section reference: non-negative index, negative index from the
/// end, or a percentage of total ticks mapped to the containing section.
fn resolve_section(reference: &SectionRef, harmony: &Harmony) -> Result<usize, EngineError> {
    let sections = harmony.section_count() as i64;
    match reference {
        SectionRef::Index(index) => {
            let resolved = if *index < 0 { sections + index } else { *index };
            if (0..sections).contains(&resolved) {
                Ok(resolved as usize)
            } else {
                Err(EngineError::SequencerConfig {
                    message: format!("section index {} out of range 0..{}", index, sections),
                })
            }
        }
        SectionRef::Percent(text) => {
            let number = text.strip_suffix('%').ok_or_else(|| {
                EngineError::SequencerConfig {
                    message: format!("invalid section reference '{}'", text),
                }
            })?;
            let pct: f64 = number.parse().map_err(|_| EngineError::SequencerConfig {
                message: format!("invalid section percentage '{}'", text),
            })?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(EngineError::SequencerConfig {
                    message: format!("section percentage '{}' out of range", text),
                });
            }
            let tick = ((pct / 100.0) * harmony.total_ticks() as f64) as usize;
            let tick = tick.min(harmony.total_ticks() - 1);
            Ok(harmony.section_of_tick(tick))
        }
    }
}
