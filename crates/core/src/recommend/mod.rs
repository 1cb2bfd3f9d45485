//! Co-purchase recommendations: cosine similarity between product basket
//! vectors, with a popularity fallback for products that have no positive
//! neighbor or no orders at all.

pub mod similarity;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderLine;
use crate::domain::product::ProductId;
pub use similarity::SimilarityMatrix;

/// Score assigned to popularity fallbacks, below any meaningful similarity.
pub const FALLBACK_SCORE: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationBasis {
    CoPurchase,
    Popularity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub product_id: ProductId,
    pub score: f64,
    pub basis: RecommendationBasis,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecommendationSet {
    pub by_product: BTreeMap<ProductId, Vec<RecommendedItem>>,
}

impl RecommendationSet {
    pub fn product_count(&self) -> usize {
        self.by_product.len()
    }

    pub fn row_count(&self) -> usize {
        self.by_product.values().map(Vec::len).sum()
    }

    pub fn fallback_product_count(&self) -> usize {
        self.by_product
            .values()
            .filter(|items| items.iter().any(|item| item.basis == RecommendationBasis::Popularity))
            .count()
    }
}

pub struct SimilarityEngine {
    matrix: SimilarityMatrix,
    popularity: Vec<ProductId>,
}

impl SimilarityEngine {
    pub fn from_lines(lines: &[OrderLine]) -> Self {
        Self { matrix: SimilarityMatrix::from_lines(lines), popularity: popularity_ranking(lines) }
    }

    pub fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    pub fn popularity(&self) -> &[ProductId] {
        &self.popularity
    }

    /// Up to `k` items for `product_id`: positive co-purchase neighbors when
    /// there are any, otherwise the most popular other products.
    pub fn recommend(&self, product_id: ProductId, k: usize) -> Vec<RecommendedItem> {
        let neighbors: Vec<RecommendedItem> = self
            .matrix
            .top_neighbors(product_id, k)
            .into_iter()
            .map(|(neighbor, score)| RecommendedItem {
                product_id: neighbor,
                score,
                basis: RecommendationBasis::CoPurchase,
            })
            .collect();

        if !neighbors.is_empty() {
            return neighbors;
        }

        self.popularity
            .iter()
            .filter(|candidate| **candidate != product_id)
            .take(k)
            .map(|candidate| RecommendedItem {
                product_id: *candidate,
                score: FALLBACK_SCORE,
                basis: RecommendationBasis::Popularity,
            })
            .collect()
    }

    pub fn recommend_all(&self, catalog: &[ProductId], k: usize) -> RecommendationSet {
        let by_product = catalog
            .iter()
            .map(|product_id| (*product_id, self.recommend(*product_id, k)))
            .collect();
        RecommendationSet { by_product }
    }
}

/// Products by total quantity sold, descending; ties by ascending id.
pub fn popularity_ranking(lines: &[OrderLine]) -> Vec<ProductId> {
    let mut totals: BTreeMap<ProductId, i64> = BTreeMap::new();
    for line in lines {
        *totals.entry(line.product_id).or_insert(0) += line.quantity;
    }

    let mut ranked: Vec<(ProductId, i64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(product_id, _)| product_id).collect()
}
