use crate::err::WorldError;

pub(crate) const DEFAULT_GROUP: &str = "w";

/// Normalizes a block type id to `group/name` lowercase. Air synonyms normalize to `""`.
pub(crate) fn normalize(id: &str) -> String {
    let id = id.trim().to_lowercase();
    if is_air(&id) {
        return String::new();
    }
    if id.contains('/') {
        id
    } else {
        format!("{DEFAULT_GROUP}/{id}")
    }
}

/// `""`, `"0"`, `"w/0"` and `"air"` all mean "no block".
pub(crate) fn is_air(id: &str) -> bool {
    matches!(
        id.trim().to_lowercase().as_str(),
        "" | "0" | "w/0" | "air" | "w/air"
    )
}

pub(crate) fn validate(id: &str) -> Result<(), WorldError> {
    let normalized = normalize(id);
    if normalized.is_empty() {
        return Ok(());
    }
    let valid = normalized
        .split_once('/')
        .is_some_and(|(group, name)| !group.is_empty() && !name.is_empty() && !name.contains('/'));
    if valid && !normalized.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(WorldError::Validation(format!("invalid block type id '{id}'")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn air_synonyms() {
        for id in ["", "0", "w/0", "air", "AIR", " w/0 "] {
            assert!(is_air(id), "{id}");
            assert_eq!(normalize(id), "");
        }
        assert!(!is_air("n:stone"));
    }

    #[test]
    fn default_group_and_case() {
        assert_eq!(normalize("Stone"), "w/stone");
        assert_eq!(normalize("N/Grass"), "n/grass");
        assert_eq!(normalize("n:stone"), "w/n:stone");
    }

    #[test]
    fn validation() {
        assert!(validate("n/grass").is_ok());
        assert!(validate("air").is_ok());
        assert!(validate("n:stone").is_ok());
        assert!(validate("/grass").is_err());
        assert!(validate("n/").is_err());
        assert!(validate("a/b/c").is_err());
        assert!(validate("red stone").is_err());
    }
}
