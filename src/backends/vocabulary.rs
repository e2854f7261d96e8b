// Vocabulary and document-term matrices for the count / TF-IDF backends.
//
// Text arrives already normalized and lemmatized, so tokenization is just
// splitting on anything that isn't a letter or digit. Document-frequency
// cutoffs follow the usual vectorizer convention: `min_df` is an absolute
// count, `max_df` a fraction of the corpus.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use stop_words::{get, LANGUAGE};

/// Stop-word list to strip before counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Italian,
    English,
}

impl Language {
    pub fn stop_words(&self) -> HashSet<String> {
        let words: Vec<String> = match self {
            Language::Italian => get(LANGUAGE::Italian),
            Language::English => get(LANGUAGE::English),
        };
        words.into_iter().map(|w| w.to_lowercase()).collect()
    }
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "italian" | "it" => Ok(Language::Italian),
            "english" | "en" => Ok(Language::English),
            other => anyhow::bail!("Unsupported language '{other}' (expected italian or english)"),
        }
    }
}

/// Document-frequency filtering for a vectorizer.
#[derive(Debug, Clone)]
pub struct VocabularyOptions {
    /// Drop terms in fewer than this many documents
    pub min_df: usize,
    /// Drop terms in more than this fraction of documents
    pub max_df: f64,
    pub stop_words: HashSet<String>,
}

impl VocabularyOptions {
    pub fn new(language: Language) -> Self {
        Self {
            min_df: 2,
            max_df: 0.95,
            stop_words: language.stop_words(),
        }
    }
}

/// Lowercased tokens of at least two characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// A sparse document-term matrix with its (alphabetical) vocabulary.
#[derive(Debug, Clone)]
pub struct TermMatrix {
    pub terms: Vec<String>,
    /// One row per document: (term index, value), sorted by term index
    pub rows: Vec<Vec<(usize, f64)>>,
}

impl TermMatrix {
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// The `n` heaviest terms of a dense topic row, heaviest first.
    /// Ties break alphabetically, via vocabulary order.
    pub fn top_terms(&self, row: &[f64], n: usize) -> Vec<(String, f64)> {
        let mut idx: Vec<usize> = (0..row.len().min(self.terms.len())).collect();
        idx.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
        idx.into_iter()
            .take(n)
            .map(|i| (self.terms[i].clone(), row[i]))
            .collect()
    }
}

/// Raw term counts per document.
pub fn count_matrix(texts: &[&str], opts: &VocabularyOptions) -> Result<TermMatrix> {
    let tokenized: Vec<Vec<String>> = texts
        .iter()
        .map(|t| tokenize(t).filter(|w| !opts.stop_words.contains(w)).collect())
        .collect();

    let n_docs = tokenized.len();
    if n_docs == 0 {
        anyhow::bail!("cannot build a vocabulary from zero documents");
    }

    let max_doc_count = opts.max_df * n_docs as f64;
    if max_doc_count < opts.min_df as f64 {
        anyhow::bail!(
            "max_df {} of {n_docs} documents allows fewer documents than min_df {}",
            opts.max_df,
            opts.min_df
        );
    }

    let mut df: BTreeMap<&str, usize> = BTreeMap::new();
    for doc in &tokenized {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let terms: Vec<String> = df
        .into_iter()
        .filter(|&(_, n)| n >= opts.min_df && n as f64 <= max_doc_count)
        .map(|(t, _)| t.to_string())
        .collect();

    if terms.is_empty() {
        anyhow::bail!(
            "no terms remain after document-frequency filtering (min_df={}, max_df={}, {n_docs} documents)",
            opts.min_df,
            opts.max_df
        );
    }

    let index: BTreeMap<&str, usize> = terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let rows = tokenized
        .iter()
        .map(|doc| {
            let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
            for token in doc {
                if let Some(&i) = index.get(token.as_str()) {
                    *counts.entry(i).or_insert(0.0) += 1.0;
                }
            }
            counts.into_iter().collect()
        })
        .collect();

    Ok(TermMatrix { terms, rows })
}

/// TF-IDF with smoothed idf (`ln((1+n)/(1+df)) + 1`) and L2-normalized rows.
pub fn tfidf_matrix(texts: &[&str], opts: &VocabularyOptions) -> Result<TermMatrix> {
    let mut matrix = count_matrix(texts, opts)?;
    let n_docs = matrix.rows.len() as f64;

    let mut df = vec![0usize; matrix.n_terms()];
    for row in &matrix.rows {
        for &(i, _) in row {
            df[i] += 1;
        }
    }
    let idf: Vec<f64> = df
        .iter()
        .map(|&d| ((1.0 + n_docs) / (1.0 + d as f64)).ln() + 1.0)
        .collect();

    for row in &mut matrix.rows {
        for (i, value) in row.iter_mut() {
            *value *= idf[*i];
        }
        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in row.iter_mut() {
                *value /= norm;
            }
        }
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> VocabularyOptions {
        VocabularyOptions {
            min_df: 2,
            max_df: 0.95,
            stop_words: ["della".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_tokenize_keeps_accented_letters() {
        let tokens: Vec<String> = tokenize("Città, perché l'economia è-cresciuta!").collect();
        assert_eq!(tokens, vec!["città", "perché", "economia", "cresciuta"]);
    }

    #[test]
    fn test_count_matrix_applies_df_cutoffs() {
        let texts = [
            "governo legge governo comune",
            "governo legge calcio comune",
            "calcio squadra comune",
            "squadra festival comune della",
        ];
        let m = count_matrix(&texts, &opts()).unwrap();
        // "comune" is in every document (> 95%), "festival" in only one
        assert_eq!(m.terms, vec!["calcio", "governo", "legge", "squadra"]);
        assert_eq!(m.rows[0], vec![(1, 2.0), (2, 1.0)]);
        assert!(m.rows[3].iter().all(|&(i, _)| i == 3));
    }

    #[test]
    fn test_count_matrix_fails_without_terms() {
        let texts = ["uno", "due", "tre"];
        assert!(count_matrix(&texts, &opts()).is_err());
    }

    #[test]
    fn test_tfidf_rows_are_unit_length() {
        let texts = ["governo legge", "governo calcio", "calcio legge", "squadra squadra calcio"];
        let m = tfidf_matrix(&texts, &opts()).unwrap();
        for row in &m.rows {
            let norm: f64 = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9, "row norm {norm}");
        }
    }

    #[test]
    fn test_top_terms_ordering() {
        let m = TermMatrix {
            terms: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![],
        };
        let top = m.top_terms(&[0.5, 0.9, 0.5], 2);
        assert_eq!(top, vec![("b".to_string(), 0.9), ("a".to_string(), 0.5)]);
    }
}
