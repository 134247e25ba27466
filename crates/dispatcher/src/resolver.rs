//! Built-in chute resolver
//!
//! Stand-in for the external rule engine: unreadable parcels go to the
//! exception chute, readable ones to the first matching barcode prefix or
//! the default chute.

use contracts::{ChuteResolver, ParcelEvent, RoutingConfig, SorterBlueprint};

/// Prefix-table resolver driven by `[routing]`
#[derive(Debug, Clone)]
pub struct DefaultChuteResolver {
    routing: RoutingConfig,
    noread_token: String,
}

impl DefaultChuteResolver {
    pub fn new(routing: RoutingConfig, noread_token: impl Into<String>) -> Self {
        Self {
            routing,
            noread_token: noread_token.into(),
        }
    }

    pub fn from_blueprint(blueprint: &SorterBlueprint) -> Self {
        Self::new(
            blueprint.routing.clone(),
            blueprint.correlation.noread_token.clone(),
        )
    }

    /// Chute for `parcel`; always positive for a validated routing table
    pub fn decide(&self, parcel: &ParcelEvent) -> i32 {
        if !parcel.has_valid_barcode(&self.noread_token) {
            return self.routing.noread_chute.unwrap_or(self.routing.default_chute);
        }
        let barcode = parcel.barcode.trim();
        self.routing
            .prefixes
            .iter()
            .find(|route| barcode.starts_with(route.prefix.as_str()))
            .map(|route| route.chute)
            .unwrap_or(self.routing.default_chute)
    }
}

impl ChuteResolver for DefaultChuteResolver {
    fn name(&self) -> &str {
        "default"
    }

    async fn resolve(&self, parcel: &ParcelEvent) -> Option<i32> {
        Some(self.decide(parcel)).filter(|chute| *chute > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PrefixRoute, DEFAULT_NOREAD_TOKEN};
    use std::time::Instant;

    fn resolver() -> DefaultChuteResolver {
        DefaultChuteResolver::new(
            RoutingConfig {
                default_chute: 1,
                noread_chute: Some(9),
                prefixes: vec![
                    PrefixRoute {
                        prefix: "SF".into(),
                        chute: 3,
                    },
                    PrefixRoute {
                        prefix: "S".into(),
                        chute: 4,
                    },
                ],
            },
            DEFAULT_NOREAD_TOKEN,
        )
    }

    fn parcel(barcode: &str) -> ParcelEvent {
        ParcelEvent::new(barcode, Instant::now(), 1)
    }

    #[tokio::test]
    async fn test_prefix_first_match_wins() {
        let r = resolver();
        assert_eq!(r.resolve(&parcel("SF0001")).await, Some(3));
        assert_eq!(r.resolve(&parcel("ST0001")).await, Some(4));
        assert_eq!(r.resolve(&parcel("JD0001")).await, Some(1));
    }

    #[tokio::test]
    async fn test_noread_goes_to_exception_chute() {
        let r = resolver();
        assert_eq!(r.resolve(&parcel(DEFAULT_NOREAD_TOKEN)).await, Some(9));
        assert_eq!(r.resolve(&parcel("")).await, Some(9));
    }

    #[test]
    fn test_noread_falls_back_to_default() {
        let r = DefaultChuteResolver::new(RoutingConfig::default(), DEFAULT_NOREAD_TOKEN);
        assert_eq!(r.decide(&parcel(DEFAULT_NOREAD_TOKEN)), 1);
    }
}
