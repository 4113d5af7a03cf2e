use log::debug;

/// Split a comma separated list, trimming each item.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|item| item.trim().to_string()).collect()
}

/// Gating and pacing parameters attached to an action with `tag:value` pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tags {
    pub cooldown: Option<f64>,
    pub duration: Option<f64>,
    pub repeats: Option<u32>,
    pub random_chance: Option<u8>,
    pub wait: Option<bool>,
}

/// The right hand side of a command entry: `"<action>, <tag>:<value>, ..."`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub action: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Cooldown,
    Duration,
    Repeats,
    RandomChance,
    Wait,
}

impl Tag {
    fn from_key(key: &str) -> Option<Tag> {
        match key {
            "cd" => Some(Tag::Cooldown),
            "d" => Some(Tag::Duration),
            "n" => Some(Tag::Repeats),
            "r" => Some(Tag::RandomChance),
            "w" => Some(Tag::Wait),
            _ => None,
        }
    }
}

pub fn parse_action_spec(spec: &str) -> Result<ActionSpec, String> {
    let mut parts = split_csv(spec).into_iter();
    let action = parts.next().unwrap_or_default();
    if action.is_empty() {
        return Err("missing action".to_string());
    }

    let mut tags = Tags::default();
    for part in parts {
        let Some((key, value)) = part.split_once(':') else {
            debug!("Ignoring tag without a value: {part:?}");
            continue;
        };
        let Some(tag) = Tag::from_key(&key.trim().to_lowercase()) else {
            debug!("Ignoring unknown tag: {part:?}");
            continue;
        };
        apply_tag(&mut tags, tag, value.trim()).map_err(|e| format!("{part:?}: {e}"))?;
    }

    Ok(ActionSpec { action, tags })
}

fn apply_tag(tags: &mut Tags, tag: Tag, value: &str) -> Result<(), String> {
    match tag {
        Tag::Cooldown => tags.cooldown = Some(parse_seconds(value)?),
        Tag::Duration => tags.duration = Some(parse_seconds(value)?),
        Tag::Repeats => tags.repeats = Some(parse_count(value)?),
        Tag::RandomChance => {
            let chance = parse_count(value)?;
            if chance > 100 {
                return Err(format!("random chance {chance} is above 100"));
            }
            tags.random_chance = Some(chance as u8);
        }
        Tag::Wait => tags.wait = Some(parse_count(value)? != 0),
    }
    Ok(())
}

fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value.parse().map_err(|_| format!("{value:?} is not a number"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("{value:?} is not a valid number of seconds"));
    }
    Ok(seconds)
}

// Counts are written as floats in older configs ("n:2.0").
fn parse_count(value: &str) -> Result<u32, String> {
    if let Ok(count) = value.parse::<u32>() {
        return Ok(count);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
        _ => Err(format!("{value:?} is not a whole number")),
    }
}

/// Rewrite the tags of an action spec, replacing existing values and appending new ones.
pub fn set_tags(spec: &str, updates: &[(String, String)]) -> String {
    let mut parts = split_csv(spec);
    for (key, value) in updates {
        let replacement = format!("{key}:{value}");
        let existing = parts
            .iter_mut()
            .skip(1)
            .find(|part| part.split_once(':').is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case(key)));
        match existing {
            Some(part) => *part = replacement,
            None => parts.push(replacement),
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let spec = parse_action_spec("w, d:1.5, cd:2, n:3, r:40").unwrap();
        assert_eq!(spec.action, "w");
        assert_eq!(
            spec.tags,
            Tags {
                cooldown: Some(2.0),
                duration: Some(1.5),
                repeats: Some(3),
                random_chance: Some(40),
                wait: None,
            }
        );
    }

    #[test]
    fn test_unknown_tags_are_ignored() {
        let spec = parse_action_spec("space, zz:1, nonsense, d:0.2").unwrap();
        assert_eq!(spec.action, "space");
        assert_eq!(spec.tags.duration, Some(0.2));
        assert_eq!(spec.tags.cooldown, None);
    }

    #[test]
    fn test_float_counts() {
        let spec = parse_action_spec("e, n:2.0, r:0").unwrap();
        assert_eq!(spec.tags.repeats, Some(2));
        assert_eq!(spec.tags.random_chance, Some(0));
    }

    #[test]
    fn test_bad_values_are_errors() {
        assert!(parse_action_spec("w, cd:soon").is_err());
        assert!(parse_action_spec("w, r:101").is_err());
        assert!(parse_action_spec("w, n:1.5").is_err());
        assert!(parse_action_spec("w, d:-1").is_err());
        assert!(parse_action_spec("").is_err());
    }

    #[test]
    fn test_set_tags() {
        let updated = set_tags("w, d:1.0, cd:2", &[("cd".into(), "5".into()), ("r".into(), "50".into())]);
        assert_eq!(updated, "w, d:1.0, cd:5, r:50");
    }
}
