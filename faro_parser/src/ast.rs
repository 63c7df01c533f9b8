//! Arena-allocated AST.
//!
//! Grown from `nova_parser`'s `ast.rs`: nodes are stored in a
//! `generational_arena::Arena<Node>` and referenced by `NodeRef`, rather than
//! boxed/linked the way a typical `enum`-of-`Box<Self>` tree would be. This
//! keeps the compiler's AST walk allocation-free after parsing and gives
//! parent nodes a cheap `Copy` handle to children.
//!
//! The sum-typed top-level variants the spec asks for — `Expression`,
//! `Statement`, `Declaration`, `ModuleItem` — are modeled as `Node` variant
//! groups rather than separate Rust types, since the arena stores one flat
//! `Node` enum; callers distinguish the groups with `Node::is_expression()`
//! etc. when it matters (mainly in the compiler's lowering rules).

pub type NodeRef = generational_arena::Index;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRef {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Init,
    Get,
    Set,
    Method,
}

#[derive(Debug, Clone)]
pub struct Decl {
    /// Binding pattern node (`Ident`, `ArrayPattern`, `ObjectPattern`).
    pub binding: NodeRef,
    /// `Node::empty()` if there is no initializer.
    pub init: NodeRef,
}

#[derive(Debug, Clone)]
pub struct VarDeclList {
    pub kind: VarKind,
    pub decls: Box<[Decl]>,
}

#[derive(Debug, Clone)]
pub struct BinaryOp {
    pub op: BinOp,
    pub lhs: NodeRef,
    pub rhs: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    ShiftLeft,
    ShiftRight,
    UShiftRight,
    Lt,
    Gt,
    Lte,
    Gte,
    Equality,
    Inequality,
    StrictEquality,
    StrictInequality,
    BAnd,
    BOr,
    Xor,
    In,
    InstanceOf,
    /// `#x in obj` — private-field brand check, gets its own opcode.
    PrivateIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub struct Logical {
    pub op: LogicalOp,
    pub lhs: NodeRef,
    pub rhs: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    ShiftLeft,
    ShiftRight,
    UShiftRight,
    BAnd,
    BOr,
    Xor,
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub op: AssignOp,
    pub target: NodeRef,
    pub value: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub op: UpdateOp,
    pub operand: NodeRef,
    pub prefix: bool,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: NodeRef,
    /// Each entry is either a plain expression or a `Node::Spread`.
    pub args: Box<[NodeRef]>,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub object: NodeRef,
    /// For computed access (`a[b]`) this is the index expression; for
    /// `a.b` it's a `Node::Ident` holding the property name; for
    /// `a.#b` it's a `Node::PrivateName`.
    pub property: NodeRef,
    pub computed: bool,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct Function {
    /// `Node::Ident` or `Node::Empty` for anonymous functions/expressions.
    pub name: NodeRef,
    pub params: Box<[NodeRef]>,
    pub body: Box<[NodeRef]>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    /// An arrow function with an expression body (`x => x + 1`) stores that
    /// expression here instead of `body` containing a single `Return`.
    pub expr_body: Option<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct Param {
    /// Binding pattern.
    pub binding: NodeRef,
    /// `Node::empty()` when there is no default.
    pub default: NodeRef,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub struct ArrayLit {
    /// Entries may be `Node::empty()` for elisions, `Node::Spread`, or any
    /// expression.
    pub elements: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct ArrayPattern {
    pub elements: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct ObjectPattern {
    pub props: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct Ternary {
    pub condition: NodeRef,
    pub consequent: NodeRef,
    pub alternate: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ForClassic {
    pub init: NodeRef,
    pub condition: NodeRef,
    pub update: NodeRef,
    pub body: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForInOfKind {
    In,
    Of,
    AwaitOf,
}

#[derive(Debug, Clone)]
pub struct ForInOf {
    pub kind: ForInOfKind,
    /// `Node::VarDeclList` or an assignment target expression.
    pub left: NodeRef,
    pub right: NodeRef,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct While {
    pub condition: NodeRef,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct DoWhile {
    pub body: NodeRef,
    pub condition: NodeRef,
}

#[derive(Debug, Clone)]
pub struct Labeled {
    pub label: SourceRef,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct If {
    pub condition: NodeRef,
    pub consequent: NodeRef,
    /// `Node::empty()` if there's no `else`.
    pub alternate: NodeRef,
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub discriminant: NodeRef,
    pub cases: Box<[Case]>,
}

#[derive(Debug, Clone)]
pub struct Case {
    /// `Node::empty()` for the `default:` case.
    pub test: NodeRef,
    pub body: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub body: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct ObjectLit {
    /// `Node::ObjectProp` or `Node::Spread` entries.
    pub props: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct ObjectProp {
    /// A `String`/`Number`/`Ident` literal name, or any expression if
    /// `computed` is set.
    pub key: NodeRef,
    /// `Node::empty()` for shorthand `{ foo }`.
    pub value: NodeRef,
    pub kind: PropKind,
    pub computed: bool,
    pub shorthand: bool,
}

#[derive(Debug, Clone)]
pub struct Try {
    pub block: Box<[NodeRef]>,
    /// `Node::empty()` if there's no `catch`.
    pub handler: NodeRef,
    pub finalizer: Option<Box<[NodeRef]>>,
}

#[derive(Debug, Clone)]
pub struct Catch {
    /// Binding pattern, or `Node::empty()` for a parameter-less `catch {}`.
    pub param: NodeRef,
    pub body: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct TemplateLiteral {
    /// Raw+cooked string chunks, one more than `expressions`.
    pub quasis: Box<[TemplateElement]>,
    pub expressions: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct TemplateElement {
    pub cooked: Box<str>,
    pub raw: Box<str>,
    pub tail: bool,
}

#[derive(Debug, Clone)]
pub struct TaggedTemplate {
    pub tag: NodeRef,
    pub quasi: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ClassBody {
    pub members: Box<[NodeRef]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Get,
    Set,
    Constructor,
}

#[derive(Debug, Clone)]
pub struct ClassMethod {
    pub key: NodeRef,
    pub value: NodeRef,
    pub kind: MethodKind,
    pub is_static: bool,
    pub computed: bool,
}

#[derive(Debug, Clone)]
pub struct ClassField {
    pub key: NodeRef,
    /// `Node::empty()` if there's no initializer.
    pub value: NodeRef,
    pub is_static: bool,
    pub computed: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: NodeRef,
    /// `Node::empty()` if there's no `extends`.
    pub super_class: NodeRef,
    pub body: Box<[NodeRef]>,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub imported: NodeRef,
    pub local: NodeRef,
    pub is_default: bool,
    pub is_namespace: bool,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub specifiers: Box<[ImportSpecifier]>,
    pub source: Box<str>,
}

#[derive(Debug, Clone)]
pub struct ExportNamed {
    pub specifiers: Box<[(NodeRef, NodeRef)]>,
    pub source: Option<Box<str>>,
}

#[derive(Debug, Clone)]
pub struct ExportDefault {
    /// A declaration or an expression.
    pub declaration: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ExportAll {
    pub as_name: NodeRef,
    pub source: Box<str>,
}

#[derive(Debug)]
pub enum Node {
    /// Reserved for [`Node::empty()`]; do not construct manually.
    Empty,

    // --- Literals & identifiers ---
    True,
    False,
    Null,
    StringLit(Box<str>),
    NumberLit(f64),
    BigIntLit(Box<str>),
    RegexLit { pattern: Box<str>, flags: Box<str> },
    Ident(SourceRef),
    PrivateName(SourceRef),
    ThisExpr,
    SuperExpr,
    NewTarget,
    ImportMeta,

    TemplateLiteral(TemplateLiteral),
    TaggedTemplate(TaggedTemplate),

    // --- Expressions ---
    Binary(BinaryOp),
    Logical(Logical),
    Assign(Assign),
    Unary(Unary),
    Update(Update),
    Member(Member),
    Call(Call),
    New(Call),
    Ternary(Ternary),
    ArrayLit(ArrayLit),
    ObjectLit(ObjectLit),
    ObjectProp(ObjectProp),
    Sequence(Box<[NodeRef]>),
    Spread(NodeRef),
    Paren(NodeRef),
    Yield { argument: NodeRef, delegate: bool },
    Await(NodeRef),
    Chain(NodeRef),

    // --- Patterns (reuse expression nodes where they overlap, e.g. Ident) ---
    ArrayPattern(ArrayPattern),
    ObjectPattern(ObjectPattern),
    AssignPattern { target: NodeRef, default: NodeRef },
    RestElement(NodeRef),

    // --- Functions & classes ---
    Function(Function),
    Param(Param),
    ClassDecl(ClassDecl),
    ClassMethod(ClassMethod),
    ClassField(ClassField),
    StaticBlock(Box<[NodeRef]>),

    // --- Statements ---
    Block(Block),
    VarDeclList(VarDeclList),
    ExprStmt(NodeRef),
    If(If),
    For(ForClassic),
    ForInOf(ForInOf),
    While(While),
    DoWhile(DoWhile),
    Break(NodeRef),
    Continue(NodeRef),
    Return(NodeRef),
    Labeled(Labeled),
    Throw(NodeRef),
    Try(Try),
    Catch(Catch),
    Switch(Switch),
    Debugger,

    // --- Modules ---
    ImportDecl(ImportDecl),
    ExportNamed(ExportNamed),
    ExportDefault(ExportDefault),
    ExportAll(ExportAll),

    /// Top-level program/module body.
    Program(Box<[NodeRef]>),
}

impl Node {
    /// A reference to the `Node::Empty` sentinel, guaranteed by the parser
    /// to live at arena index 0.
    #[inline]
    pub fn empty() -> NodeRef {
        generational_arena::Index::from_raw_parts(0, 0)
    }
}
