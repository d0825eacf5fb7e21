// Corpus processing: vocabulary fitting and document-term vectorization.

pub mod document;
pub mod prepared;
pub mod vectorizer;
pub mod vocabulary;
