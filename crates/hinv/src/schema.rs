//! Block classification
//!
//! A [Schema] declares which attributes and which block types (and how many labels each) may
//! appear in a body. [classify] sorts the structures of a body into a [BodyContent] and reports
//! everything else: unexpected elements are warnings, wrong label counts are errors.
use crate::diagnostics::{Diagnostics, Issue, SourceLocation};
use crate::hcl_documents::{HclDocuments, SourceDocument};
use hcl_edit::structure::{Attribute, Block, Body};
use hcl_edit::Span;

#[derive(Debug, Clone, Copy)]
pub enum Attributes {
    /// any attribute key is accepted (`vars`)
    Any,
    Only(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct BlockSchema {
    pub ident: &'static str,
    pub labels: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub attributes: Attributes,
    pub blocks: &'static [BlockSchema],
}

const VARS: BlockSchema = BlockSchema {
    ident: "vars",
    labels: 0,
};
const TRANSPORT: BlockSchema = BlockSchema {
    ident: "transport",
    labels: 1,
};
const ESCALATE: BlockSchema = BlockSchema {
    ident: "escalate",
    labels: 0,
};

pub const ROOT: Schema = Schema {
    attributes: Attributes::Only(&[]),
    blocks: &[
        VARS,
        TRANSPORT,
        ESCALATE,
        BlockSchema {
            ident: "group",
            labels: 1,
        },
        BlockSchema {
            ident: "host",
            labels: 1,
        },
    ],
};

pub const GROUP: Schema = Schema {
    attributes: Attributes::Only(&["parent"]),
    blocks: &[VARS, TRANSPORT, ESCALATE],
};

pub const HOST: Schema = Schema {
    attributes: Attributes::Only(&["groups"]),
    blocks: &[VARS, TRANSPORT, ESCALATE],
};

pub const VARIABLES: Schema = Schema {
    attributes: Attributes::Any,
    blocks: &[],
};

pub const ESCALATION: Schema = Schema {
    attributes: Attributes::Only(&["password"]),
    blocks: &[],
};

/// Transport settings are checked per kind by the builder
pub const TRANSPORT_SETTINGS: Schema = Schema {
    attributes: Attributes::Any,
    blocks: &[],
};

impl Schema {
    fn accepts_attribute(&self, key: &str) -> bool {
        match self.attributes {
            Attributes::Any => true,
            Attributes::Only(keys) => keys.contains(&key),
        }
    }

    fn block(&self, ident: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|block| block.ident == ident)
    }
}

/// An hcl element together with the document it was declared in
#[derive(Debug)]
pub struct Located<'a, T> {
    pub document: &'a SourceDocument,
    pub item: &'a T,
}

impl<'a, T> Clone for Located<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Located<'a, T> {}

impl<'a, T: Span> Located<'a, T> {
    pub fn location(&self) -> SourceLocation {
        self.document.locate(self.item.span())
    }
}

impl<'a> Located<'a, Attribute> {
    pub fn key(&self) -> &'a str {
        self.item.key.value().as_str()
    }
}

impl<'a> Located<'a, Block> {
    pub fn ident(&self) -> &'a str {
        self.item.ident.value().as_str()
    }

    pub fn label(&self) -> Option<&'a str> {
        self.item.labels.first().map(|label| label.as_str())
    }

    /// Classifies the body of this block
    pub fn classify(&self, schema: &Schema, diagnostics: &mut Diagnostics) -> BodyContent<'a> {
        classify_body(self.document, &self.item.body, schema, diagnostics)
    }
}

/// Attributes and blocks of a body that matched a [Schema]
#[derive(Debug)]
pub struct BodyContent<'a> {
    pub attributes: indexmap::IndexMap<&'a str, Located<'a, Attribute>>,
    pub blocks: Vec<Located<'a, Block>>,
}

impl<'a> BodyContent<'a> {
    pub fn attribute(&self, key: &str) -> Option<Located<'a, Attribute>> {
        self.attributes.get(key).copied()
    }

    pub fn blocks_of<'s>(&'s self, ident: &'s str) -> impl Iterator<Item = Located<'a, Block>> + 's {
        self.blocks
            .iter()
            .copied()
            .filter(move |block| block.ident() == ident)
    }
}

/// Classifies the root structures of all loaded documents as one body
pub fn classify_documents<'a>(
    documents: &'a HclDocuments,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> BodyContent<'a> {
    classify(
        documents
            .attributes()
            .map(|(_, document, item)| Located { document, item }),
        documents
            .blocks()
            .map(|(_, document, item)| Located { document, item }),
        schema,
        diagnostics,
    )
}

pub fn classify_body<'a>(
    document: &'a SourceDocument,
    body: &'a Body,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> BodyContent<'a> {
    classify(
        body.attributes().map(|item| Located { document, item }),
        body.blocks().map(|item| Located { document, item }),
        schema,
        diagnostics,
    )
}

pub fn classify<'a>(
    attributes: impl IntoIterator<Item = Located<'a, Attribute>>,
    blocks: impl IntoIterator<Item = Located<'a, Block>>,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> BodyContent<'a> {
    let mut content = BodyContent {
        attributes: Default::default(),
        blocks: Default::default(),
    };

    for attribute in attributes {
        let key = attribute.key();
        if !schema.accepts_attribute(key) {
            diagnostics.warning(
                Issue::UnexpectedAttribute(key.to_owned()),
                attribute.location(),
            );
            continue;
        }

        if content.attributes.contains_key(key) {
            diagnostics.error(
                Issue::DuplicateAttribute(key.to_owned()),
                attribute.location(),
            );
            continue;
        }

        content.attributes.insert(key, attribute);
    }

    for block in blocks {
        let Some(block_schema) = schema.block(block.ident()) else {
            diagnostics.warning(
                Issue::UnexpectedBlock(block.ident().to_owned()),
                block.location(),
            );
            continue;
        };

        if block.item.labels.len() != block_schema.labels {
            diagnostics.error(
                Issue::BlockLabels {
                    ident: block_schema.ident.to_owned(),
                    expected: block_schema.labels,
                    found: block.item.labels.len(),
                },
                block.location(),
            );
            continue;
        }

        tracing::trace!(ident = block.ident(), label = ?block.label(), "classified block");
        content.blocks.push(block);
    }

    content
}
