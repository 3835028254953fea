//! Output layers and top-k label search

use super::matrix::Matrix;
use super::reader::invalid_data;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;

/// Log with the same epsilon fastText uses when ranking
pub(crate) fn std_log(x: f32) -> f32 {
    (x + 1e-5).ln()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    label: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.label.cmp(&self.label))
    }
}

/// Bounded min-heap keeping the `k` best log-scores
struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    /// True when `score` cannot enter a full heap
    fn rejects(&self, score: f32) -> bool {
        self.heap.len() >= self.k
            && self
                .heap
                .peek()
                .is_some_and(|Reverse(worst)| score < worst.score)
    }

    fn push(&mut self, score: f32, label: usize) {
        if self.k == 0 {
            return;
        }
        self.heap.push(Reverse(Candidate { score, label }));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// `(label, log-score)` pairs, best first
    fn into_sorted(self) -> Vec<(usize, f32)> {
        let mut candidates: Vec<Candidate> =
            self.heap.into_iter().map(|Reverse(c)| c).collect();
        candidates.sort_by(|a, b| b.cmp(a));
        candidates.into_iter().map(|c| (c.label, c.score)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: Option<usize>,
    right: Option<usize>,
}

/// Huffman tree over label frequencies; internal node `i` uses output row
/// `i - nlabels`
#[derive(Debug)]
pub(crate) struct HuffmanTree {
    nodes: Vec<TreeNode>,
    nlabels: usize,
}

impl HuffmanTree {
    /// Build from label counts sorted by descending frequency
    pub(crate) fn build(counts: &[i64]) -> Self {
        let osz = counts.len();
        let total = 2 * osz - 1;
        let mut nodes = vec![
            TreeNode {
                left: None,
                right: None,
            };
            total
        ];
        let mut weight: Vec<i64> = vec![1_000_000_000_000_000; total];
        weight[..osz].copy_from_slice(counts);

        // Two-queue construction: leaves are consumed from the rare end while
        // merged nodes are consumed in creation order.
        let mut leaf = osz as isize - 1;
        let mut node = osz;
        for i in osz..total {
            let mut mini = [0usize; 2];
            for slot in &mut mini {
                if leaf >= 0 && weight[leaf as usize] < weight[node] {
                    *slot = leaf as usize;
                    leaf -= 1;
                } else {
                    *slot = node;
                    node += 1;
                }
            }
            nodes[i] = TreeNode {
                left: Some(mini[0]),
                right: Some(mini[1]),
            };
            weight[i] = weight[mini[0]] + weight[mini[1]];
        }

        Self {
            nodes,
            nlabels: osz,
        }
    }

    fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    fn search(&self, node: usize, score: f32, search: &mut TreeSearch<'_>) {
        if score < search.min_score || search.top.rejects(score) {
            return;
        }
        let TreeNode { left, right } = self.nodes[node];
        let (Some(left), Some(right)) = (left, right) else {
            search.top.push(score, node);
            return;
        };
        let f = sigmoid(search.output.dot_row(search.hidden, node - self.nlabels));
        self.search(left, score + std_log(1.0 - f), search);
        self.search(right, score + std_log(f), search);
    }
}

struct TreeSearch<'a> {
    output: &'a Matrix,
    hidden: &'a [f32],
    min_score: f32,
    top: TopK,
}

/// Loss function the model was trained with; decides how output rows turn
/// into label probabilities
#[derive(Debug)]
pub(crate) enum Loss {
    HierarchicalSoftmax(HuffmanTree),
    NegativeSampling,
    Softmax,
    OneVsAll,
}

impl Loss {
    pub(crate) fn from_id(id: i32, label_counts: &[i64]) -> io::Result<Self> {
        match id {
            1 => Ok(Loss::HierarchicalSoftmax(HuffmanTree::build(label_counts))),
            2 => Ok(Loss::NegativeSampling),
            3 => Ok(Loss::Softmax),
            4 => Ok(Loss::OneVsAll),
            other => Err(invalid_data(format!("unknown loss function {}", other))),
        }
    }

    /// Output rows this loss reads for `nlabels` labels
    pub(crate) fn output_rows_needed(&self, nlabels: usize) -> usize {
        match self {
            Loss::HierarchicalSoftmax(_) => nlabels - 1,
            _ => nlabels,
        }
    }

    /// Up to `k` `(label, log-probability)` pairs with probability >=
    /// `threshold`, best first
    pub(crate) fn predict(
        &self,
        output: &Matrix,
        hidden: &[f32],
        nlabels: usize,
        k: usize,
        threshold: f32,
    ) -> Vec<(usize, f32)> {
        match self {
            Loss::HierarchicalSoftmax(tree) => {
                let mut search = TreeSearch {
                    output,
                    hidden,
                    min_score: std_log(threshold),
                    top: TopK::new(k),
                };
                tree.search(tree.root(), 0.0, &mut search);
                search.top.into_sorted()
            }
            Loss::Softmax => {
                let mut scores: Vec<f32> =
                    (0..nlabels).map(|i| output.dot_row(hidden, i)).collect();
                let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut z = 0.0;
                for s in &mut scores {
                    *s = (*s - max).exp();
                    z += *s;
                }
                scores.iter_mut().for_each(|s| *s /= z);
                best_of(&scores, k, threshold)
            }
            Loss::NegativeSampling | Loss::OneVsAll => {
                let scores: Vec<f32> = (0..nlabels)
                    .map(|i| sigmoid(output.dot_row(hidden, i)))
                    .collect();
                best_of(&scores, k, threshold)
            }
        }
    }
}

fn best_of(probabilities: &[f32], k: usize, threshold: f32) -> Vec<(usize, f32)> {
    let mut top = TopK::new(k);
    for (label, &p) in probabilities.iter().enumerate() {
        if p < threshold {
            continue;
        }
        let score = std_log(p);
        if top.rejects(score) {
            continue;
        }
        top.push(score, label);
    }
    top.into_sorted()
}
