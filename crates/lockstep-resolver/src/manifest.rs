use std::str::FromStr;

use lockstep_distribution_types::Requirement;
use lockstep_normalize::PackageName;
use lockstep_pep508::Pep508Error;

use crate::lock::content_hash;

/// The requirements the project declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    requirements: Vec<Requirement>,
}

impl Manifest {
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    /// Parse one PEP 508 requirement per item.
    pub fn parse<'a>(requirements: impl IntoIterator<Item = &'a str>) -> Result<Self, Pep508Error> {
        let requirements = requirements
            .into_iter()
            .map(Requirement::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(requirements))
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether the project itself requires `name`.
    pub fn is_direct(&self, name: &PackageName) -> bool {
        self.requirements
            .iter()
            .any(|requirement| requirement.name == *name)
    }

    /// The hash a lock file records to detect changes to the requirements.
    pub fn content_hash(&self) -> String {
        content_hash(&self.requirements)
    }
}
