use std::collections::{BTreeMap, BTreeSet};

use crate::domain::order::{OrderId, OrderLine};
use crate::domain::product::ProductId;

/// Sparse symmetric cosine similarity between product basket vectors, where a
/// product's vector holds its summed quantity per order. Only non-zero
/// off-diagonal entries are stored; the diagonal is never a candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimilarityMatrix {
    products: BTreeSet<ProductId>,
    entries: BTreeMap<ProductId, BTreeMap<ProductId, f64>>,
}

impl SimilarityMatrix {
    pub fn from_lines(lines: &[OrderLine]) -> Self {
        let mut baskets: BTreeMap<OrderId, BTreeMap<ProductId, f64>> = BTreeMap::new();
        for line in lines {
            *baskets.entry(line.order_id).or_default().entry(line.product_id).or_insert(0.0) +=
                line.quantity as f64;
        }

        let mut squared_norms: BTreeMap<ProductId, f64> = BTreeMap::new();
        let mut dots: BTreeMap<(ProductId, ProductId), f64> = BTreeMap::new();
        for basket in baskets.values() {
            let items: Vec<(ProductId, f64)> = basket.iter().map(|(id, qty)| (*id, *qty)).collect();
            for (position, (product, quantity)) in items.iter().enumerate() {
                *squared_norms.entry(*product).or_insert(0.0) += quantity * quantity;
                for (other, other_quantity) in &items[position + 1..] {
                    *dots.entry((*product, *other)).or_insert(0.0) += quantity * other_quantity;
                }
            }
        }

        let mut entries: BTreeMap<ProductId, BTreeMap<ProductId, f64>> = BTreeMap::new();
        for ((left, right), dot) in dots {
            let norm = (squared_norms[&left] * squared_norms[&right]).sqrt();
            // Zero-norm vectors have similarity 0 with everything.
            if norm == 0.0 || dot == 0.0 {
                continue;
            }
            let score = dot / norm;
            entries.entry(left).or_default().insert(right, score);
            entries.entry(right).or_default().insert(left, score);
        }

        Self { products: squared_norms.into_keys().collect(), entries }
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.products.contains(&product_id)
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn score(&self, left: ProductId, right: ProductId) -> f64 {
        if left == right {
            return if self.contains(left) { 1.0 } else { 0.0 };
        }
        self.entries.get(&left).and_then(|row| row.get(&right)).copied().unwrap_or(0.0)
    }

    /// Strictly positive neighbors of `product_id`, best first (ties by
    /// ascending id), at most `k`. Never includes `product_id` itself.
    pub fn top_neighbors(&self, product_id: ProductId, k: usize) -> Vec<(ProductId, f64)> {
        let Some(row) = self.entries.get(&product_id) else {
            return Vec::new();
        };

        let mut ranked: Vec<(ProductId, f64)> = row
            .iter()
            .filter(|(neighbor, score)| **neighbor != product_id && **score > 0.0)
            .map(|(neighbor, score)| (*neighbor, *score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::SimilarityMatrix;
    use crate::domain::order::{OrderId, OrderLine};
    use crate::domain::product::ProductId;

    fn line(order: i64, product: i64, quantity: i64) -> OrderLine {
        OrderLine {
            order_id: OrderId(order),
            product_id: ProductId(product),
            quantity,
            ordered_at: Utc::now(),
        }
    }

    #[test]
    fn cosine_matches_hand_computation() {
        // Orders A, B, C: p1 = [2,1,0], p2 = [1,0,2], p3 = [0,3,0].
        let matrix = SimilarityMatrix::from_lines(&[
            line(1, 1, 2),
            line(1, 2, 1),
            line(2, 1, 1),
            line(2, 3, 3),
            line(3, 2, 2),
        ]);

        let p1_p2 = 2.0 / (5.0f64.sqrt() * 5.0f64.sqrt());
        let p1_p3 = 3.0 / (5.0f64.sqrt() * 3.0);
        assert!((matrix.score(ProductId(1), ProductId(2)) - p1_p2).abs() < 1e-12);
        assert!((matrix.score(ProductId(1), ProductId(3)) - p1_p3).abs() < 1e-12);
        assert_eq!(matrix.score(ProductId(2), ProductId(3)), 0.0);

        let neighbors = matrix.top_neighbors(ProductId(1), 5);
        assert_eq!(neighbors[0].0, ProductId(3));
        assert_eq!(neighbors[1].0, ProductId(2));
    }

    #[test]
    fn repeated_lines_in_one_order_are_summed() {
        let matrix = SimilarityMatrix::from_lines(&[
            line(1, 1, 1),
            line(1, 1, 1),
            line(1, 2, 2),
        ]);
        assert!((matrix.score(ProductId(1), ProductId(2)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_quantity_product_has_no_neighbors() {
        let matrix = SimilarityMatrix::from_lines(&[line(1, 1, 0), line(1, 2, 4)]);
        assert!(matrix.contains(ProductId(1)));
        assert!(matrix.top_neighbors(ProductId(1), 3).is_empty());
    }

    #[test]
    fn neighbors_respect_k_and_tie_order() {
        let matrix = SimilarityMatrix::from_lines(&[
            line(1, 5, 1),
            line(1, 3, 1),
            line(1, 4, 1),
        ]);
        let neighbors = matrix.top_neighbors(ProductId(5), 1);
        assert_eq!(neighbors, vec![(ProductId(3), 1.0)]);
    }
}
