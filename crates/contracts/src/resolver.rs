//! ChuteResolver trait - external chute decision
//!
//! The rule engine is an external collaborator; the core only consumes the
//! chute number it returns.

use crate::ParcelEvent;

/// Chute decision trait
#[trait_variant::make(ChuteResolver: Send)]
pub trait LocalChuteResolver {
    /// Resolver name (used for logging)
    fn name(&self) -> &str;

    /// Decide the chute for an enriched parcel
    ///
    /// `None` means no decision; the parcel is not actuated.
    async fn resolve(&self, parcel: &ParcelEvent) -> Option<i32>;
}
