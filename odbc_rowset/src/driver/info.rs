/// `SQL_SCROLL_OPTIONS` bits.
pub const SO_FORWARD_ONLY: u32 = 0x0000_0001;
pub const SO_KEYSET_DRIVEN: u32 = 0x0000_0002;
pub const SO_DYNAMIC: u32 = 0x0000_0004;
pub const SO_MIXED: u32 = 0x0000_0008;
pub const SO_STATIC: u32 = 0x0000_0010;

/// `SQL_*_CURSOR_ATTRIBUTES2` concurrency bits (ODBC 3).
pub const CA2_READ_ONLY_CONCURRENCY: u32 = 0x0000_0001;
pub const CA2_LOCK_CONCURRENCY: u32 = 0x0000_0002;
pub const CA2_OPT_ROWVER_CONCURRENCY: u32 = 0x0000_0004;
pub const CA2_OPT_VALUES_CONCURRENCY: u32 = 0x0000_0008;

/// `SQL_SCROLL_CONCURRENCY` bits (ODBC 2).
pub const SCCO_READ_ONLY: u32 = 0x0000_0001;
pub const SCCO_LOCK: u32 = 0x0000_0002;
pub const SCCO_OPT_ROWVER: u32 = 0x0000_0004;
pub const SCCO_OPT_VALUES: u32 = 0x0000_0008;

/// `SQL_GETDATA_EXTENSIONS` bits.
pub const GD_ANY_COLUMN: u32 = 0x0000_0001;
pub const GD_ANY_ORDER: u32 = 0x0000_0002;
pub const GD_BLOCK: u32 = 0x0000_0004;
pub const GD_BOUND: u32 = 0x0000_0008;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorType {
    ForwardOnly,
    KeysetDriven,
    Dynamic,
    Static,
}

impl CursorType {
    /// `SQL_CURSOR_*` value.
    pub fn code(self) -> u32 {
        match self {
            Self::ForwardOnly => 0,
            Self::KeysetDriven => 1,
            Self::Dynamic => 2,
            Self::Static => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concurrency {
    ReadOnly,
    Lock,
    RowVer,
    Values,
}

impl Concurrency {
    /// `SQL_CONCUR_*` value.
    pub fn code(self) -> u32 {
        match self {
            Self::ReadOnly => 1,
            Self::Lock => 2,
            Self::RowVer => 3,
            Self::Values => 4,
        }
    }
}

/// Optional driver entry points the statement layer adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedFunctions {
    pub num_params: bool,
    pub describe_param: bool,
    pub bulk_operations: bool,
    pub set_pos: bool,
    pub more_results: bool,
}

impl Default for SupportedFunctions {
    fn default() -> Self {
        Self {
            num_params: true,
            describe_param: true,
            bulk_operations: true,
            set_pos: true,
            more_results: true,
        }
    }
}

/// Capability table read once per connection.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub major_version: u16,
    pub minor_version: u16,
    pub getdata_extensions: u32,
    pub cursor_mask: u32,
    pub forward_only_attrs: u32,
    pub static_attrs: u32,
    pub keyset_attrs: u32,
    pub dynamic_attrs: u32,
    /// ODBC 2 drivers report one concurrency mask for every cursor type.
    pub concurrency_mask: u32,
    pub functions: SupportedFunctions,
    pub driver_name: String,
    pub driver_version: String,
}

impl DriverInfo {
    pub fn is_odbc3(&self) -> bool {
        self.major_version >= 3
    }

    pub fn supports_forward_only(&self) -> bool {
        self.cursor_mask & SO_FORWARD_ONLY != 0
    }

    pub fn supports_static(&self) -> bool {
        self.cursor_mask & SO_STATIC != 0
    }

    pub fn supports_keyset(&self) -> bool {
        self.cursor_mask & SO_KEYSET_DRIVEN != 0
    }

    pub fn supports_dynamic(&self) -> bool {
        self.cursor_mask & SO_DYNAMIC != 0
    }

    pub fn supports_scroll_sensitive(&self) -> bool {
        self.supports_dynamic() || self.supports_keyset()
    }

    /// Cursor used for scroll-sensitive result sets. Only meaningful when
    /// [`supports_scroll_sensitive`](Self::supports_scroll_sensitive) holds.
    pub fn scroll_sensitive_cursor(&self) -> CursorType {
        if self.supports_dynamic() {
            CursorType::Dynamic
        } else {
            CursorType::KeysetDriven
        }
    }

    fn concurrency_bits(&self, cursor: CursorType, odbc3_bit: u32, odbc2_bit: u32) -> bool {
        if self.is_odbc3() {
            let attrs = match cursor {
                CursorType::ForwardOnly => self.forward_only_attrs,
                CursorType::Static => self.static_attrs,
                CursorType::KeysetDriven => self.keyset_attrs,
                CursorType::Dynamic => self.dynamic_attrs,
            };
            attrs & odbc3_bit != 0
        } else {
            self.concurrency_mask & odbc2_bit != 0
        }
    }

    pub fn supports_read_only(&self, cursor: CursorType) -> bool {
        self.concurrency_bits(cursor, CA2_READ_ONLY_CONCURRENCY, SCCO_READ_ONLY)
    }

    pub fn supports_lock(&self, cursor: CursorType) -> bool {
        self.concurrency_bits(cursor, CA2_LOCK_CONCURRENCY, SCCO_LOCK)
    }

    pub fn supports_rowver(&self, cursor: CursorType) -> bool {
        self.concurrency_bits(cursor, CA2_OPT_ROWVER_CONCURRENCY, SCCO_OPT_ROWVER)
    }

    pub fn supports_values(&self, cursor: CursorType) -> bool {
        self.concurrency_bits(cursor, CA2_OPT_VALUES_CONCURRENCY, SCCO_OPT_VALUES)
    }

    pub fn supports_updatable(&self, cursor: CursorType) -> bool {
        self.supports_lock(cursor) || self.supports_rowver(cursor) || self.supports_values(cursor)
    }

    /// Preferred updatable concurrency for `cursor`, falling back to read-only.
    pub fn updatable_concurrency(&self, cursor: CursorType) -> Concurrency {
        if self.supports_rowver(cursor) {
            Concurrency::RowVer
        } else if self.supports_values(cursor) {
            Concurrency::Values
        } else if self.supports_lock(cursor) {
            Concurrency::Lock
        } else {
            Concurrency::ReadOnly
        }
    }

    pub fn supports_getdata_any_order(&self) -> bool {
        self.getdata_extensions & GD_ANY_ORDER != 0
    }

    pub fn supports_getdata_any_column(&self) -> bool {
        self.getdata_extensions & GD_ANY_COLUMN != 0
    }

    pub fn supports_getdata_block(&self) -> bool {
        self.getdata_extensions & GD_BLOCK != 0
    }

    pub fn supports_getdata_bound(&self) -> bool {
        self.getdata_extensions & GD_BOUND != 0
    }
}

impl Default for DriverInfo {
    fn default() -> Self {
        let all = CA2_READ_ONLY_CONCURRENCY
            | CA2_LOCK_CONCURRENCY
            | CA2_OPT_ROWVER_CONCURRENCY
            | CA2_OPT_VALUES_CONCURRENCY;
        Self {
            major_version: 3,
            minor_version: 0,
            getdata_extensions: GD_ANY_COLUMN | GD_ANY_ORDER | GD_BLOCK | GD_BOUND,
            cursor_mask: SO_FORWARD_ONLY | SO_STATIC | SO_KEYSET_DRIVEN | SO_DYNAMIC,
            forward_only_attrs: CA2_READ_ONLY_CONCURRENCY,
            static_attrs: all,
            keyset_attrs: all,
            dynamic_attrs: all,
            concurrency_mask: SCCO_READ_ONLY,
            functions: SupportedFunctions::default(),
            driver_name: "Unknown".to_string(),
            driver_version: "Unknown".to_string(),
        }
    }
}
