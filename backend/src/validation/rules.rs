//! Common validation rules shared across request payloads.

use validator::ValidationError;

const MAX_CUISINES: usize = 20;
const MAX_CUISINE_LEN: usize = 64;

/// Validates price level filters.
///
/// Requirements:
/// - Each level between 1 and 4
/// - No duplicates
#[allow(clippy::ptr_arg)]
pub fn validate_price_levels(levels: &Vec<u8>) -> Result<(), ValidationError> {
    if levels.iter().any(|level| !(1..=4).contains(level)) {
        return Err(ValidationError::new("price_level_out_of_range"));
    }
    let mut seen = [false; 5];
    for level in levels {
        if seen[*level as usize] {
            return Err(ValidationError::new("price_level_duplicate"));
        }
        seen[*level as usize] = true;
    }
    Ok(())
}

/// Validates cuisine tags.
///
/// Requirements:
/// - At most 20 tags
/// - Each tag 1-64 characters after trimming
#[allow(clippy::ptr_arg)]
pub fn validate_cuisines(cuisines: &Vec<String>) -> Result<(), ValidationError> {
    if cuisines.len() > MAX_CUISINES {
        return Err(ValidationError::new("cuisines_too_many"));
    }
    if cuisines
        .iter()
        .any(|c| c.trim().is_empty() || c.chars().count() > MAX_CUISINE_LEN)
    {
        return Err(ValidationError::new("cuisine_invalid_length"));
    }
    Ok(())
}

/// Validates participant ids supplied by clients.
///
/// Requirements:
/// - Not blank
/// - At most 128 characters
pub fn validate_participant_id(user_id: &str) -> Result<(), ValidationError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() || trimmed.len() > 128 {
        return Err(ValidationError::new("user_id_invalid_length"));
    }
    Ok(())
}
