//! Bundled device definitions, one module per vendor.

pub mod develco;
pub mod gledopto;
pub mod ledvance;

use crate::definition::Definition;
use crate::error::Result;

/// Every bundled definition, in registration order.
pub fn all_definitions() -> Result<Vec<Definition>> {
    let mut definitions = gledopto::definitions()?;
    definitions.extend(ledvance::definitions());
    definitions.extend(develco::definitions());
    Ok(definitions)
}
