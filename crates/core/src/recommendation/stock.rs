use serde::Serialize;

use crate::catalog::Catalog;
use crate::domain::product::ProductId;
use crate::events::{EventSink, RecommendationEvent};
use crate::recommendation::RecommendationResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    UnknownProduct,
    OutOfStock,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownProduct => "unknown_product",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DroppedRecommendation {
    pub product_id: ProductId,
    pub reason: DropReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockFilterOutcome {
    pub result: RecommendationResult,
    pub dropped: Vec<DroppedRecommendation>,
}

/// Removes ids that are not in the catalogue or have no stock. Order of the
/// remaining ids and the reply text are left untouched. Ids arrive already
/// deduplicated by [`RecommendationResult::new`].
#[derive(Clone, Copy, Debug)]
pub struct StockFilter<'a> {
    catalog: &'a Catalog,
}

impl<'a> StockFilter<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn apply(&self, result: RecommendationResult, events: &dyn EventSink) -> StockFilterOutcome {
        let (reply, recommended_ids) = result.into_parts();
        let mut kept = Vec::with_capacity(recommended_ids.len());
        let mut dropped = Vec::new();

        for product_id in recommended_ids {
            match self.catalog.find(product_id) {
                Some(product) if product.is_in_stock() => kept.push(product_id),
                Some(_) => dropped.push(DroppedRecommendation {
                    product_id,
                    reason: DropReason::OutOfStock,
                }),
                None => dropped.push(DroppedRecommendation {
                    product_id,
                    reason: DropReason::UnknownProduct,
                }),
            }
        }

        for entry in &dropped {
            events.emit(
                RecommendationEvent::warn("stock.dropped", "recommended product removed")
                    .with_metadata("product_id", entry.product_id.to_string())
                    .with_metadata("reason", entry.reason.as_str()),
            );
        }

        StockFilterOutcome { result: RecommendationResult::new(reply, kept), dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::{DropReason, DroppedRecommendation, StockFilter};
    use crate::catalog::Catalog;
    use crate::domain::product::ProductId;
    use crate::events::InMemoryEventSink;
    use crate::recommendation::RecommendationResult;

    fn catalog() -> Catalog {
        Catalog::from_json_str(
            r#"[
                {"id":1,"name":"Veste","category":"Randonnée","price":89,"stock_level":5},
                {"id":2,"name":"T-shirt","category":"Running","price":29,"stock_level":0},
                {"id":3,"name":"Gants","category":"Vélo","price":22,"stock_level":3}
            ]"#,
        )
        .expect("catalogue")
    }

    #[test]
    fn out_of_stock_and_unknown_ids_are_removed_in_order() {
        let catalog = catalog();
        let sink = InMemoryEventSink::default();
        let input = RecommendationResult::new(
            "Prends la veste, le t-shirt et les gants",
            vec![ProductId(1), ProductId(2), ProductId(99), ProductId(3)],
        );

        let outcome = StockFilter::new(&catalog).apply(input, &sink);

        assert_eq!(outcome.result.reply(), "Prends la veste, le t-shirt et les gants");
        assert_eq!(outcome.result.recommended_ids(), vec![ProductId(1), ProductId(3)]);
        assert_eq!(
            outcome.dropped,
            vec![
                DroppedRecommendation { product_id: ProductId(2), reason: DropReason::OutOfStock },
                DroppedRecommendation {
                    product_id: ProductId(99),
                    reason: DropReason::UnknownProduct
                },
            ]
        );
        assert_eq!(sink.event_types(), vec!["stock.dropped", "stock.dropped"]);
    }

    #[test]
    fn fully_available_result_passes_through() {
        let catalog = catalog();
        let sink = InMemoryEventSink::default();
        let input = RecommendationResult::new("ok", vec![ProductId(3), ProductId(1)]);

        let outcome = StockFilter::new(&catalog).apply(input.clone(), &sink);

        assert_eq!(outcome.result, input);
        assert!(outcome.dropped.is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn repeated_ids_are_kept_once_and_dropped_once() {
        let catalog = catalog();
        let sink = InMemoryEventSink::default();
        let input = RecommendationResult::new(
            "ok",
            vec![ProductId(1), ProductId(1), ProductId(2), ProductId(1), ProductId(2), ProductId(3)],
        );

        let outcome = StockFilter::new(&catalog).apply(input, &sink);

        assert_eq!(outcome.result.recommended_ids(), vec![ProductId(1), ProductId(3)]);
        assert_eq!(
            outcome.dropped,
            vec![DroppedRecommendation { product_id: ProductId(2), reason: DropReason::OutOfStock }]
        );
        let shown: Vec<_> =
            catalog.by_ids(outcome.result.recommended_ids()).iter().map(|product| product.id).collect();
        assert_eq!(shown, outcome.result.recommended_ids());
    }

    #[test]
    fn embedded_catalogue_drops_its_out_of_stock_items() {
        let catalog = Catalog::embedded().expect("embedded");
        let sink = InMemoryEventSink::default();
        let input = RecommendationResult::new("ok", vec![ProductId(5), ProductId(1)]);

        let outcome = StockFilter::new(&catalog).apply(input, &sink);

        assert_eq!(outcome.result.recommended_ids(), vec![ProductId(1)]);
    }
}
