//! RPN query trees and their wire encoding.
//!
//! A query is a closed sum: leaves carry a Bib-1 Use attribute and a
//! search term, internal nodes carry a boolean operator and exactly
//! two subtrees.  Boolean evaluation is left-associative in the order
//! the tree was built.

use crate::ber::{self, Class, Packet};
use crate::bib1;
use crate::error::{LocalError, LocalResult};

// Wire tags within an RPN structure.
const TAG_OPERAND: u32 = 0;
const TAG_COMPLEX: u32 = 1;
const TAG_ATTRIBUTES_PLUS_TERM: u32 = 102;
const TAG_ATTRIBUTE_LIST: u32 = 44;
const TAG_ATTRIBUTE_TYPE: u32 = 120;
const TAG_ATTRIBUTE_VALUE: u32 = 121;
const TAG_TERM: u32 = 45;
const TAG_OPERATOR: u32 = 46;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    AndNot,
}

impl Operator {
    pub fn code(self) -> i64 {
        match self {
            Self::And => 0,
            Self::Or => 1,
            Self::AndNot => 2,
        }
    }

    /// Resolve a numeric operator code.  Codes outside the known set
    /// fall back to And rather than failing the PDU.
    pub fn from_code(code: i64) -> Operator {
        match code {
            1 => Self::Or,
            2 => Self::AndNot,
            _ => Self::And,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::AndNot => write!(f, "AND-NOT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Leaf {
        attribute: u16,
        term: String,
    },
    Branch {
        op: Operator,
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
}

impl QueryNode {
    pub fn leaf(attribute: bib1::Use, term: impl Into<String>) -> Self {
        QueryNode::Leaf {
            attribute: attribute.code(),
            term: term.into(),
        }
    }

    /// Leaf carrying a raw attribute code, for callers speaking
    /// numeric Bib-1.
    pub fn leaf_code(attribute: u16, term: impl Into<String>) -> Self {
        QueryNode::Leaf {
            attribute,
            term: term.into(),
        }
    }

    pub fn join(op: Operator, left: QueryNode, right: QueryNode) -> Self {
        QueryNode::Branch {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        Self::join(Operator::And, left, right)
    }

    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        Self::join(Operator::Or, left, right)
    }

    pub fn and_not(left: QueryNode, right: QueryNode) -> Self {
        Self::join(Operator::AndNot, left, right)
    }

    /// Serialize into the RPNStructure wire shape.
    pub fn to_packet(&self) -> Packet {
        match self {
            QueryNode::Leaf { attribute, term } => {
                let element = Packet::sequence(vec![
                    Packet::context_int(TAG_ATTRIBUTE_TYPE, bib1::Attribute::Use as i64),
                    Packet::context_int(TAG_ATTRIBUTE_VALUE, *attribute as i64),
                ]);

                let attr_term = Packet::context_seq(
                    TAG_ATTRIBUTES_PLUS_TERM,
                    vec![
                        Packet::context_seq(TAG_ATTRIBUTE_LIST, vec![element]),
                        Packet::context_str(TAG_TERM, term),
                    ],
                );

                Packet::context_seq(TAG_OPERAND, vec![attr_term])
            }
            QueryNode::Branch { op, left, right } => {
                let operator = Packet::constructed(
                    Class::Context,
                    TAG_OPERATOR,
                    vec![Packet::primitive(
                        Class::Universal,
                        ber::TAG_INTEGER,
                        ber::encode_int(op.code()),
                    )],
                );

                Packet::context_seq(
                    TAG_COMPLEX,
                    vec![left.to_packet(), right.to_packet(), operator],
                )
            }
        }
    }

    /// Parse an RPNStructure packet back into a tree.
    pub fn from_packet(packet: &Packet) -> LocalResult<QueryNode> {
        match packet.tag {
            TAG_OPERAND => Self::parse_operand(packet),
            TAG_COMPLEX => Self::parse_complex(packet),
            _ => Err(LocalError::ExpectedOperand),
        }
    }

    fn parse_operand(packet: &Packet) -> LocalResult<QueryNode> {
        let attr_term = packet
            .child(TAG_ATTRIBUTES_PLUS_TERM)
            .ok_or(LocalError::ExpectedOperand)?;

        let term = attr_term
            .child(TAG_TERM)
            .ok_or(LocalError::MissingTerm)?
            .str_value();

        // First Use attribute in the list wins; an absent list leaves
        // the attribute at 0, which downstream maps to "Any".
        let mut attribute: u16 = 0;
        if let Some(list) = attr_term.child(TAG_ATTRIBUTE_LIST) {
            for element in list.children() {
                let attr_type = element
                    .child(TAG_ATTRIBUTE_TYPE)
                    .map(|p| p.int_value())
                    .unwrap_or(bib1::Attribute::Use as i64);

                if attr_type == bib1::Attribute::Use as i64 {
                    if let Some(value) = element.child(TAG_ATTRIBUTE_VALUE) {
                        attribute = value.int_value() as u16;
                        break;
                    }
                }
            }
        }

        Ok(QueryNode::Leaf { attribute, term })
    }

    fn parse_complex(packet: &Packet) -> LocalResult<QueryNode> {
        let mut operands = packet
            .children()
            .iter()
            .filter(|c| c.tag != TAG_OPERATOR);

        let left = operands.next().ok_or(LocalError::ExpectedOperand)?;
        let right = operands.next().ok_or(LocalError::ExpectedOperand)?;

        let op = match packet.child(TAG_OPERATOR) {
            Some(operator) => match operator.children().first() {
                // The usual form: a universal INTEGER inside the
                // Operator wrapper.
                Some(inner) if inner.class == Class::Universal => {
                    Operator::from_code(inner.int_value())
                }
                // Some origins tag the operator choice directly.
                Some(inner) => Operator::from_code(inner.tag as i64),
                None => Operator::And,
            },
            None => Operator::And,
        };

        Ok(QueryNode::join(
            op,
            QueryNode::from_packet(left)?,
            QueryNode::from_packet(right)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: u16,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(attribute: bib1::Use) -> Self {
        SortKey {
            attribute: attribute.code(),
            descending: false,
        }
    }

    pub fn descending(attribute: bib1::Use) -> Self {
        SortKey {
            attribute: attribute.code(),
            descending: true,
        }
    }
}

/// A root query plus the result-shaping options that ride along with
/// it: row window and sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredQuery {
    pub root: QueryNode,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort_keys: Vec<SortKey>,
}

impl StructuredQuery {
    pub fn new(root: QueryNode) -> Self {
        StructuredQuery {
            root,
            limit: None,
            offset: None,
            sort_keys: Vec::new(),
        }
    }
}
