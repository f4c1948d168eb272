use crate::code::Label;
use crate::names::BinaryName;

/// Errors raised while building or materializing generated classes
///
/// Build errors are raised synchronously at the offending builder call; the variants carry the
/// operation and the expected vs. actual types. The label variants are deferred to
/// materialization, since only a whole method body reveals them. Failures of *generated* code
/// (division by zero, failed casts, null receivers) are not here - they surface as
/// [`crate::runtime::RuntimeError`] when the generated method runs.
#[derive(Debug)]
pub enum Error {
    /// `declare_class` was called twice for the same class
    DuplicateClassDeclaration(BinaryName),

    /// A member was declared on a class that has not been declared yet
    ///
    /// Member *handles* may be created before the owning class is declared (forward references),
    /// but member *declarations* may not.
    UndeclaredClass(BinaryName),

    /// A method or field was declared twice
    DuplicateMemberDeclaration {
        class: BinaryName,
        member: String,
    },

    /// A constant value does not structurally match the type it is assigned to
    ConstantTypeMismatch {
        expected: String,
        found: &'static str,
    },

    /// A local from one method body was used in another
    ForeignLocal {
        register: u16,
    },

    /// A label from one method body was used in another
    ForeignLabel(Label),

    /// A local with the wrong static type was supplied to an instruction
    LocalTypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    /// Parameter index outside `[0, parameter count)`
    ParameterIndexOutOfRange {
        index: usize,
        count: usize,
    },

    /// Expected parameter type does not exactly match the declared parameter type
    ParameterTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// `receiver` was called on a static method
    ReceiverOnStaticMethod,

    /// The receiver local's type is not the owning class
    WrongReceiverType {
        expected: String,
        found: String,
    },

    /// Returned local (or `return_void`) does not match the declared return type
    ReturnTypeMismatch {
        method: String,
        expected: String,
        found: String,
    },

    /// An operand type is outside the set an operation accepts
    InvalidOperandType {
        operation: &'static str,
        found: String,
    },

    /// Two operands that must share a static type do not
    OperandTypeMismatch {
        operation: &'static str,
        first: String,
        second: String,
    },

    /// A numeric cast between a type and itself
    IdenticalCastTypes(String),

    /// A local that must be object-typed is not
    NotAnObjectType {
        context: &'static str,
        found: String,
    },

    /// Wrong number of arguments for an invoke
    ArgumentCountMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    /// Wrong argument type for an invoke (index 0 is the receiver for instance dispatch)
    ArgumentTypeMismatch {
        method: String,
        index: usize,
        expected: String,
        found: String,
    },

    /// The destination local of an invoke does not match the callee's return type
    ResultTypeMismatch {
        method: String,
        expected: String,
        found: String,
    },

    /// The value local of a field access does not exactly match the field's type
    FieldTypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// The instance local of a field access is not assignable to the field's owner
    FieldOwnerMismatch {
        field: String,
        found: String,
    },

    /// A method body was attached twice
    BodyAlreadyAttached {
        method: String,
    },

    /// A method body does not end with a return or unconditional jump
    BodyNotTerminated {
        method: String,
    },

    /// A body allocated more registers than the image's `u16` register space can address
    RegisterLimitExceeded {
        method: String,
    },

    /// A declared method never received a body
    MissingBody {
        method: String,
    },

    /// A label referenced by a branch was never bound
    UnboundLabel {
        method: String,
        label: Label,
    },

    /// A label was bound at two positions
    LabelBoundTwice {
        method: String,
        label: Label,
    },

    IoError(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
