//! The bridging compatibility check shared by [`crate::builder::event`] and
//! [`crate::builder::command`]: fanout sources only bridge to fanout, and
//! direct/topic sources only bridge to direct or topic (so routing keys
//! survive the hop).

use crate::error::ContractValidationError;
use crate::model::{Exchange, ExchangeKind};

pub(crate) fn check_bridge_compatible(source: &Exchange, bridge: &Exchange) -> Result<(), ContractValidationError> {
    let compatible = matches!(
        (source.kind(), bridge.kind()),
        (ExchangeKind::Fanout, ExchangeKind::Fanout)
            | (ExchangeKind::Direct | ExchangeKind::Topic, ExchangeKind::Direct | ExchangeKind::Topic)
    );

    if compatible {
        Ok(())
    } else {
        Err(ContractValidationError::IncompatibleBridgeKind {
            source: source.name().to_string(),
            source_kind: source.kind(),
            bridge: bridge.name().to_string(),
            bridge_kind: bridge.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fanout_only_bridges_to_fanout() {
        // Given
        let source = Exchange::builder("orders", ExchangeKind::Fanout).build();
        let bridge = Exchange::builder("local-orders", ExchangeKind::Direct).build();

        // When
        let actual = check_bridge_compatible(&source, &bridge);

        // Then
        assert!(matches!(actual, Err(ContractValidationError::IncompatibleBridgeKind { .. })));
    }

    #[test]
    fn topic_source_may_bridge_to_direct_or_topic() {
        // Given
        let source = Exchange::builder("orders", ExchangeKind::Topic).build();
        let bridge = Exchange::builder("local-orders", ExchangeKind::Direct).build();

        // When
        let actual = check_bridge_compatible(&source, &bridge);

        // Then
        assert_eq!(actual, Ok(()));
    }
}
