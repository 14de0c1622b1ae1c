use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetLocatorError {
    #[error("asset locator must not be empty")]
    Empty,
    #[error("asset locator must not start with '/'")]
    LeadingSlash,
    #[error("asset locator must not contain '\\\\'")]
    Backslash,
    #[error("asset locator must not contain a '..' segment")]
    ParentTraversal,
    #[error("asset locator has an empty path segment")]
    EmptySegment,
    #[error("asset locator contains control character {character:?}")]
    ControlCharacter { character: char },
}

/// Locators are relative, '/'-separated paths under the asset root. Non-ASCII
/// folder and file names are allowed.
pub fn validate_asset_locator(locator: &str) -> Result<(), AssetLocatorError> {
    if locator.is_empty() {
        return Err(AssetLocatorError::Empty);
    }
    if locator.starts_with('/') {
        return Err(AssetLocatorError::LeadingSlash);
    }
    if locator.contains('\\') {
        return Err(AssetLocatorError::Backslash);
    }
    if let Some(character) = locator.chars().find(|ch| ch.is_control()) {
        return Err(AssetLocatorError::ControlCharacter { character });
    }
    for segment in locator.split('/') {
        match segment {
            "" => return Err(AssetLocatorError::EmptySegment),
            ".." => return Err(AssetLocatorError::ParentTraversal),
            _ => {}
        }
    }
    Ok(())
}
