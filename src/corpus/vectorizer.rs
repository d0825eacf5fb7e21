// Corpus vectorizer: token sequences to a sparse document-term matrix.
//
// The matrix is stored in compressed sparse row form. Columns follow the
// vocabulary's index assignment exactly; tokens outside the vocabulary are
// dropped silently. The transform is a pure function of (documents,
// vocabulary), so it can apply a vocabulary fit on one corpus to another.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::document::Document;
use super::vocabulary::Vocabulary;

/// Sparse token-count matrix: rows are documents, columns vocabulary indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTermMatrix {
    n_cols: usize,
    /// Row i occupies indices[indptr[i]..indptr[i + 1]]
    indptr: Vec<usize>,
    /// Column ids, ascending within each row
    indices: Vec<u32>,
    counts: Vec<u32>,
}

impl DocumentTermMatrix {
    /// Assemble a matrix from per-row (column, count) lists.
    ///
    /// Zero counts are skipped; entries are sorted by column within a row and
    /// duplicate columns are summed. Columns must be below `n_cols`.
    pub fn from_rows(n_cols: usize, rows: &[Vec<(usize, u32)>]) -> anyhow::Result<Self> {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut counts = Vec::new();
        indptr.push(0);

        for (row_id, row) in rows.iter().enumerate() {
            let mut merged: BTreeMap<usize, u32> = BTreeMap::new();
            for &(col, count) in row {
                if col >= n_cols {
                    anyhow::bail!("row {row_id} has column {col} but the matrix has {n_cols} columns");
                }
                if count > 0 {
                    *merged.entry(col).or_insert(0) += count;
                }
            }
            for (col, count) in merged {
                indices.push(col as u32);
                counts.push(count);
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            n_cols,
            indptr,
            indices,
            counts,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.counts.len()
    }

    /// Iterate the (column, count) entries of one row in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        let (start, end) = self.row_bounds(row);
        self.indices[start..end]
            .iter()
            .zip(&self.counts[start..end])
            .map(|(&col, &count)| (col as usize, count))
    }

    /// Count at (row, col), zero when absent.
    pub fn get(&self, row: usize, col: usize) -> u32 {
        let (start, end) = self.row_bounds(row);
        match self.indices[start..end].binary_search(&(col as u32)) {
            Ok(pos) => self.counts[start + pos],
            Err(_) => 0,
        }
    }

    pub fn row_sum(&self, row: usize) -> u64 {
        let (start, end) = self.row_bounds(row);
        self.counts[start..end].iter().map(|&c| c as u64).sum()
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// For each column, the number of rows with a non-zero entry.
    pub fn column_document_frequencies(&self) -> Vec<u64> {
        let mut df = vec![0u64; self.n_cols];
        for &col in &self.indices {
            df[col as usize] += 1;
        }
        df
    }

    /// For each column, the ascending list of rows containing it.
    pub fn column_rows(&self) -> Vec<Vec<u32>> {
        let mut postings: Vec<Vec<u32>> = vec![Vec::new(); self.n_cols];
        for row in 0..self.n_rows() {
            for (col, _) in self.row(row) {
                postings[col].push(row as u32);
            }
        }
        postings
    }

    fn row_bounds(&self, row: usize) -> (usize, usize) {
        (self.indptr[row], self.indptr[row + 1])
    }
}

/// Count in-vocabulary tokens of each document into a DTM.
pub fn vectorize(documents: &[Document], vocabulary: &Vocabulary) -> DocumentTermMatrix {
    let mut indptr = Vec::with_capacity(documents.len() + 1);
    let mut indices = Vec::new();
    let mut counts = Vec::new();
    indptr.push(0);

    for doc in documents {
        let mut row: BTreeMap<u32, u32> = BTreeMap::new();
        for token in doc.tokens() {
            if let Some(col) = vocabulary.index_of(token) {
                *row.entry(col as u32).or_insert(0) += 1;
            }
        }
        for (col, count) in row {
            indices.push(col);
            counts.push(count);
        }
        indptr.push(indices.len());
    }

    DocumentTermMatrix {
        n_cols: vocabulary.len(),
        indptr,
        indices,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::vocabulary::VocabularyThresholds;

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .map(|t| t.split_whitespace().collect())
            .collect()
    }

    fn vocab(tokens: &[&str]) -> Vocabulary {
        Vocabulary::from_tokens(
            tokens.iter().map(|t| t.to_string()).collect(),
            VocabularyThresholds::default(),
        )
        .unwrap()
    }

    #[test]
    fn counts_follow_vocabulary_columns() {
        let v = vocab(&["cat", "sat", "the"]);
        let dtm = vectorize(&docs(&["the cat sat the"]), &v);
        assert_eq!(dtm.n_rows(), 1);
        assert_eq!(dtm.n_cols(), 3);
        assert_eq!(dtm.row(0).collect::<Vec<_>>(), vec![(0, 1), (1, 1), (2, 2)]);
        assert_eq!(dtm.get(0, 2), 2);
    }

    #[test]
    fn out_of_vocabulary_tokens_are_dropped() {
        let v = vocab(&["cat"]);
        let dtm = vectorize(&docs(&["dog dog cat", "fish"]), &v);
        assert_eq!(dtm.row_sum(0), 1);
        assert_eq!(dtm.row_sum(1), 0);
        assert_eq!(dtm.nnz(), 1);
    }

    #[test]
    fn column_statistics() {
        let v = vocab(&["a", "b", "c"]);
        let dtm = vectorize(&docs(&["a b b", "b c", "a"]), &v);
        assert_eq!(dtm.column_document_frequencies(), vec![2, 2, 1]);
        assert_eq!(dtm.column_rows()[1], vec![0, 1]);
        assert_eq!(dtm.total_count(), 6);
    }

    #[test]
    fn from_rows_merges_and_validates() {
        let dtm = DocumentTermMatrix::from_rows(3, &[vec![(2, 1), (0, 2), (2, 3)], vec![(1, 0)]])
            .unwrap();
        assert_eq!(dtm.row(0).collect::<Vec<_>>(), vec![(0, 2), (2, 4)]);
        assert_eq!(dtm.row_sum(1), 0);
        assert!(DocumentTermMatrix::from_rows(2, &[vec![(2, 1)]]).is_err());
    }
}
