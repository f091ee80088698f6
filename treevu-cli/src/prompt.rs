//! Line-based terminal prompts.

use anyhow::Result;
use std::io::{self, Write};

pub fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

/// Prompt showing the current value; an empty answer keeps it.
pub fn prompt_default(label: &str, current: &str) -> Result<String> {
    let answer = if current.is_empty() {
        prompt(label)?
    } else {
        prompt(&format!("{label} [{current}]"))?
    };
    Ok(if answer.is_empty() { current.to_string() } else { answer })
}

pub fn confirm(label: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "Y/n" } else { "y/N" };
    let answer = prompt(&format!("{label} ({hint})"))?;
    Ok(parse_yes(&answer, default_yes))
}

fn parse_yes(answer: &str, default_yes: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" | "s" | "si" | "sí" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_answers() {
        assert!(parse_yes("", true));
        assert!(!parse_yes("", false));
        assert!(parse_yes("Sí", false));
        assert!(!parse_yes("nope", true));
    }
}
