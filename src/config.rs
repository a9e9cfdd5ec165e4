//! Binding-file loader.
//!
//! Line format: `<pin>_<gesture>=<command>`, where `gesture` is `click` or
//! `long_click` and `command` is taken verbatim up to the end of the line.
//! Lines starting with `#` and empty lines are skipped. The first line
//! naming a pin opens its driver handle; later lines append bindings to the
//! same button in file order. Any malformed line abandons the whole load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::button::{Binding, Button, ButtonSet, Gesture};
use crate::gpio::InputSource;

struct Entry<'a> {
    pin: u32,
    gesture: Gesture,
    action: &'a str,
}

/// Load the binding file at `path`, opening a driver handle per distinct pin
/// through `open_pin`.
pub fn load(
    path: &Path,
    open_pin: impl FnMut(u32) -> Result<Box<dyn InputSource>>,
) -> Result<ButtonSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    load_str(&text, &path.display().to_string(), open_pin)
}

fn load_str(
    text: &str,
    origin: &str,
    mut open_pin: impl FnMut(u32) -> Result<Box<dyn InputSource>>,
) -> Result<ButtonSet> {
    let mut buttons = ButtonSet::new();

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = parse_line(line)
            .map_err(|problem| anyhow!("{}: at line {}: {}", origin, lineno, problem))?;

        let id = match buttons.lookup_pin(entry.pin) {
            Some(id) => id,
            None => {
                let source = open_pin(entry.pin).with_context(|| {
                    format!("{}: at line {}: cannot open GPIO {}", origin, lineno, entry.pin)
                })?;
                buttons.insert(Button::new(entry.pin, source))
            }
        };
        buttons.get_mut(id).bind(Binding {
            gesture: entry.gesture,
            action: entry.action.to_string(),
        });
    }

    Ok(buttons)
}

fn parse_line(line: &str) -> Result<Entry<'_>, String> {
    let (lhs, action) = line.split_once('=').ok_or_else(|| "expected '='".to_string())?;

    let digits_end = lhs
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lhs.len());
    let (digits, keyword) = lhs.split_at(digits_end);
    if digits.is_empty() {
        return Err("expected a GPIO pin number".to_string());
    }
    let pin: u32 = digits
        .parse()
        .map_err(|_| format!("GPIO pin {} out of range", digits))?;

    let gesture = match keyword {
        "_click" => Gesture::Click,
        "_long_click" => Gesture::LongClick,
        _ => return Err(format!("unknown event '{}'", keyword)),
    };

    Ok(Entry {
        pin,
        gesture,
        action,
    })
}
