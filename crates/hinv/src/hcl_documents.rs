//! collection of hcl documents ([Body] and the source it was parsed from)
//!
//! [HclDocuments] tracks
//! - the source path and text (to turn byte spans into line/column locations)
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use crate::diagnostics::SourceLocation;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<SourceDocument>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

impl HclDocuments {
    /// Parses and indexes an hcl document
    pub fn insert(
        &mut self,
        text: impl Into<String>,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        let text = text.into();
        let document = hcl_edit::parser::parse_body(&text)?;
        self.insert_body(document, text, path.into());
        Ok(())
    }

    fn insert_body(&mut self, document: Body, text: String, path: Option<PathBuf>) {
        let source_index = self.sources.len();
        self.sources.push(SourceDocument { path, text });

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn get_attribute(&self, index: usize) -> SourceAttribute {
        let (source_index, attribute) = &self.root_attributes[index];
        (index, &self.sources[*source_index], attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .enumerate()
            .map(|(index, (source_index, attribute))| {
                (index, &self.sources[*source_index], attribute)
            })
    }

    pub fn get_block(&self, index: usize) -> SourceBlock {
        let (source_index, block) = &self.root_blocks[index];
        (index, &self.sources[*source_index], block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        self.insert(file_contents, Some(file_path))
    }

    /// Loads every `*.hcl` file of a directory (not recursive), sorted by file name
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        let read_dir = std::fs::read_dir(dir_path)?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_hcl_file = dir_entry.file_name().to_string_lossy().ends_with(".hcl");
            if !is_hcl_file {
                continue;
            }

            file_paths.push(dir_entry.path());
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound);
        }

        // read_dir order is platform dependent, declaration order must not be
        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No files found in directory")]
    NoFilesFound,
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
}

/// A loaded document: where it came from and its text
#[derive(Debug)]
pub struct SourceDocument {
    path: Option<PathBuf>,
    text: String,
}

impl SourceDocument {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Turns a byte span of this document into a line/column location
    pub fn locate(&self, span: Option<Range<usize>>) -> SourceLocation {
        let Some(span) = span else {
            return SourceLocation {
                path: self.path.clone(),
                ..Default::default()
            };
        };

        let start = span.start.min(self.text.len());
        let before = &self.text[..start];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;

        SourceLocation {
            path: self.path.clone(),
            line,
            column,
        }
    }
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use hinv::hcl_documents;
/// hcl_documents!("host \"web1\" {}");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use hinv::hcl_documents;
/// hcl_documents! {
///   "groups.hcl" => "group \"web\" {}",
///   "hosts.hcl" => "host \"web1\" { groups = [\"web\"] }"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use hinv::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        docs.insert($expr, None::<::std::path::PathBuf>).expect("body must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert($expr, Some(::std::path::PathBuf::from($source))).expect("body must parse");
        )+

        docs
    }};
}

pub type SourceAttribute<'a> = (usize, &'a SourceDocument, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a SourceDocument, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    use hcl_edit::Span;

    #[test]
    fn iterators() {
        let hcl_documents = hcl_documents! {r#"
        attr_1 = 1
        one two {}
        three four five {}
        attr_2 = 2
        attr_3 = 3
        "#};

        assert_eq!(hcl_documents.attributes().count(), 3);
        assert_eq!(hcl_documents.blocks().count(), 2);
    }

    #[test]
    fn multiple_sources() {
        let hcl_documents = hcl_documents! {
            "one.hcl" => "one {}",
            "two.hcl" => "two {}"
        };

        assert_eq!(hcl_documents.source_count(), 2);
        let (_, source, _) = hcl_documents.get_block(1);
        assert_eq!(source.path(), Some(std::path::Path::new("two.hcl")));
    }

    #[test]
    fn locate_block() {
        let hcl_documents = hcl_documents!("attr = 1\nhost \"web1\" {}\n");

        let (_, source, block) = hcl_documents.get_block(0);
        let location = source.locate(block.span());
        assert_eq!((location.line, location.column), (2, 1));
    }
}
