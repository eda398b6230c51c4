//! Link-time collection of suite definitions registered with `#[suite]`.

use crate::suite::{DeclarationError, Suite};

/// A function that declares groups and tests into a suite
pub struct SuiteDefinition {
    pub name: &'static str,
    pub module: &'static str,
    pub define: fn(&mut Suite) -> Result<(), DeclarationError>,
}

impl std::fmt::Debug for SuiteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteDefinition")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

inventory::collect!(SuiteDefinition);

/// Every registered definition, ordered by name.
pub fn registered() -> Vec<&'static SuiteDefinition> {
    let mut definitions: Vec<_> = inventory::iter::<SuiteDefinition>().collect();
    definitions.sort_by_key(|definition| (definition.name, definition.module));
    definitions
}

/// Apply every registered definition to `suite`, returning how many ran.
pub fn collect(suite: &mut Suite) -> Result<usize, DeclarationError> {
    let definitions = registered();
    for definition in &definitions {
        tracing::debug!(name = definition.name, module = definition.module, "declaring suite");
        (definition.define)(suite)?;
    }
    Ok(definitions.len())
}

/// A suite holding every registered definition.
pub fn default_suite() -> Result<Suite, DeclarationError> {
    let mut suite = Suite::new();
    collect(&mut suite)?;
    Ok(suite)
}
