//! Sparse Search using Tantivy (BM25)
//!
//! One in-RAM index per corpus version, built once and then only read.
//! Query text is run through the field analyzer and turned into a
//! disjunction of term queries, so arbitrary user input never hits the
//! query-language parser.

use tantivy::{
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
        STRING,
    },
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, TantivyDocument, Term,
};

use docchat_core::{Chunk, CorpusVersion, LexicalHit, LexicalIndex};

use crate::RagError;

const TOKENIZER: &str = "docchat_en";
const WRITER_MEMORY: usize = 50_000_000;

/// BM25 index over chunk text and header path
pub struct SparseIndex {
    version: CorpusVersion,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    header_field: Field,
    doc_count: usize,
}

impl SparseIndex {
    /// Index all chunks for `version`
    pub fn build(version: CorpusVersion, chunks: &[Chunk]) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let header_field = schema_builder.add_text_field("header", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register(TOKENIZER, Self::build_tokenizer());

        let mut writer = index
            .writer(WRITER_MEMORY)
            .map_err(|e| RagError::Index(e.to_string()))?;

        for chunk in chunks {
            let mut doc = TantivyDocument::default();
            doc.add_text(id_field, &chunk.id);
            doc.add_text(text_field, &chunk.text);
            if !chunk.header_path.is_empty() {
                doc.add_text(header_field, &chunk.header_path);
            }
            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::debug!(version = %version, chunks = chunks.len(), "Built sparse index");

        Ok(Self {
            version,
            reader,
            id_field,
            text_field,
            header_field,
            doc_count: chunks.len(),
        })
    }

    fn build_tokenizer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build()
    }

    /// Analyzed query terms, deduplicated in first-seen order
    fn query_terms(&self, text: &str) -> Vec<String> {
        let mut analyzer = Self::build_tokenizer();
        let mut stream = analyzer.token_stream(text);
        let mut terms: Vec<String> = Vec::new();
        while stream.advance() {
            let token = stream.token().text.clone();
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
        terms
    }

    fn build_query(&self, terms: &[String]) -> BooleanQuery {
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .flat_map(|t| [self.text_field, self.header_field].map(|f| (f, t)))
            .map(|(field, term)| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(field, term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        BooleanQuery::new(clauses)
    }
}

impl LexicalIndex for SparseIndex {
    fn version(&self) -> CorpusVersion {
        self.version
    }

    fn search(
        &self,
        text: &str,
        version: CorpusVersion,
        k: usize,
    ) -> docchat_core::Result<Vec<LexicalHit>> {
        self.check_version(version)?;

        let terms = self.query_terms(text);
        if k == 0 || terms.is_empty() || self.doc_count == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = self.build_query(&terms);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;

            if let Some(OwnedValue::Str(id)) = doc.get_first(self.id_field) {
                hits.push((id.to_string(), score));
            }
        }

        Ok(hits)
    }

    fn len(&self) -> usize {
        self.doc_count
    }
}

impl std::fmt::Debug for SparseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseIndex")
            .field("version", &self.version)
            .field("docs", &self.doc_count)
            .finish()
    }
}
