//! The interpreter AST: every node carries a source position and may carry
//! a parse-recovery note attached by the tolerant parser.

use super::AstMeta;
use crate::error::Pos;

/// Interpreter-side node metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IMeta {
    pub pos: Pos,
    /// Recovery note left by the tolerant parser, if any.
    pub note: Option<Box<str>>,
}

impl IMeta {
    #[must_use]
    pub fn at(pos: Pos) -> Self {
        Self { pos, note: None }
    }
}

impl AstMeta for IMeta {}

pub type Program = super::Program<IMeta>;
pub type Block = super::Block<IMeta>;
pub type Stmt = super::Stmt<IMeta>;
pub type Expr = super::Expr<IMeta>;
pub type ActionDef = super::ActionDef<IMeta>;

impl Expr {
    /// The position recorded on this node.
    #[must_use]
    pub fn pos(&self) -> Pos {
        match self {
            Self::Identifier { meta, .. }
            | Self::Integer { meta, .. }
            | Self::Float { meta, .. }
            | Self::Str { meta, .. }
            | Self::Bool { meta, .. }
            | Self::Null { meta }
            | Self::ListLiteral { meta, .. }
            | Self::MapLiteral { meta, .. }
            | Self::Lambda { meta, .. }
            | Self::Call { meta, .. }
            | Self::MethodCall { meta, .. }
            | Self::PropertyAccess { meta, .. }
            | Self::Index { meta, .. }
            | Self::Assignment { meta, .. }
            | Self::Prefix { meta, .. }
            | Self::Infix { meta, .. }
            | Self::IfExpression { meta, .. }
            | Self::Await { meta, .. }
            | Self::EmbeddedLiteral { meta, .. } => meta.pos,
            Self::ActionLiteral(def) => def.meta.pos,
        }
    }
}

impl Stmt {
    /// The position recorded on this node.
    #[must_use]
    pub fn pos(&self) -> Pos {
        match self {
            Self::Let { meta, .. }
            | Self::Return { meta, .. }
            | Self::ExpressionStatement { meta, .. }
            | Self::Print { meta, .. }
            | Self::ForEach { meta, .. }
            | Self::If { meta, .. }
            | Self::While { meta, .. }
            | Self::TryCatch { meta, .. }
            | Self::Event { meta, .. }
            | Self::Emit { meta, .. }
            | Self::Enum { meta, .. }
            | Self::Protocol { meta, .. }
            | Self::Contract { meta, .. }
            | Self::ExternalDeclaration { meta, .. }
            | Self::Export { meta, .. }
            | Self::Debug { meta, .. }
            | Self::Use { meta, .. }
            | Self::Import { meta, .. }
            | Self::ScreenDef { meta, .. }
            | Self::ComponentDef { meta, .. }
            | Self::ThemeDef { meta, .. }
            | Self::PersistentStorage { meta, .. }
            | Self::Require { meta, .. }
            | Self::Exactly { meta }
            | Self::Malformed { meta, .. } => meta.pos,
            Self::Action(def) => def.meta.pos,
            Self::Block(block) => block.stmts.first().map_or(Pos::default(), Self::pos),
        }
    }
}
