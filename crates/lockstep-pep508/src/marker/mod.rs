//! Environment markers: parsing, concrete evaluation, and symbolic evaluation over a range of
//! environments.

pub use environment::{MarkerEnvironment, RangedEnvironment};
pub use symbolic::{MarkerTruth, python_version_to_range};
pub use tree::{
    ExtraOperator, MarkerExpression, MarkerOperator, MarkerTree, MarkerValueString,
    MarkerValueVersion,
};

pub(crate) use tree::parse_markers;

mod environment;
mod symbolic;
mod tree;
