//! Application constants for flatrec
//!
//! Conversion-option keys, built-in converter names and default values
//! shared by the schema model, the conversion registry and the engines.

// =============================================================================
// Conversion Option Keys
// =============================================================================

/// Keys recognised in a record element's conversion-options map
pub mod options {
    /// Justification applied on read (strip padding) and write (add padding)
    pub const JUSTIFY: &str = "justify";

    /// Character(s) treated as padding by `justify`
    pub const PAD_CHARACTER: &str = "pad-character";

    /// Strip mode: `non-numeric`, `non-alpha` or `non-alphanumeric`
    pub const STRIP_CHARS: &str = "strip-chars";

    /// `begin,end` character range kept from the field text
    pub const SUBSTRING: &str = "substring";

    /// Replacement text used when the field is blank
    pub const DEFAULT_VALUE: &str = "default-value";

    /// Concatenate onto the property's current value instead of replacing it
    pub const APPEND: &str = "append";

    /// Date/time pattern for the date converter
    pub const FORMAT: &str = "format";

    /// Numeric text carries no decimal point; `decimal-places` locates it
    pub const DECIMAL_IMPLIED: &str = "decimal-implied";

    /// Number of fractional digits for numeric converters
    pub const DECIMAL_PLACES: &str = "decimal-places";
}

// =============================================================================
// Built-in Converters
// =============================================================================

/// Implementation identifier of the built-in converter set
pub const CORE_CONVERTERS: &str = "core";

/// Converter names pre-registered on every conversion registry
pub mod converters {
    pub const STRING: &str = "string";
    pub const CHAR: &str = "char";
    pub const DOUBLE: &str = "double";
    pub const DECIMAL: &str = "decimal";
    pub const BIG_DECIMAL: &str = "bigdecimal";
    pub const FLOAT: &str = "float";
    pub const LONG: &str = "long";
    pub const INTEGER: &str = "integer";
    pub const INT: &str = "int";
    pub const DATE: &str = "date";
    pub const BOOLEAN: &str = "boolean";

    /// Name aliases and the core method each resolves to
    pub const BUILT_INS: &[(&str, &str)] = &[
        (STRING, STRING),
        (CHAR, STRING),
        (DOUBLE, DOUBLE),
        (DECIMAL, DOUBLE),
        (BIG_DECIMAL, BIG_DECIMAL),
        (FLOAT, FLOAT),
        (LONG, LONG),
        (INTEGER, INTEGER),
        (INT, INTEGER),
        (DATE, DATE),
        (BOOLEAN, BOOLEAN),
    ];
}

// =============================================================================
// Defaults
// =============================================================================

/// Date pattern used when no `format` option is configured
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd";

/// Default pad character for `justify`
pub const DEFAULT_PAD_CHARACTER: &str = " ";

/// Default `justify` direction when the option value is empty
pub const DEFAULT_JUSTIFY: &str = "both";

/// Function name invoked by script identities when none is configured
pub const DEFAULT_SCRIPT_FUNCTION: &str = "matchesLine";

/// Script engine label assumed when none is configured
pub const DEFAULT_SCRIPT_ENGINE: &str = "native";

/// Default encoding label
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Default separator written after each physical line
pub const DEFAULT_LINE_SEPARATOR: &str = "\n";
