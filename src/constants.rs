pub mod crypto {

    pub const FIELD_KEY_LEN: usize = 32;

    pub const FIELD_IV_LEN: usize = 16;

    pub const FIELD_SEPARATOR: char = ':';
}

pub mod totp {

    pub const DIGITS: u32 = 6;

    pub const STEP_SECONDS: u64 = 30;

    pub const SECRET_BYTES: usize = 20;
}

pub mod session {

    pub const COOKIE_NAME: &str = "session";

    pub const DEFAULT_TTL_HOURS: u32 = 8;
}

pub mod limits {

    pub const DEFAULT_PAGE_SIZE: u64 = 50;

    pub const MAX_PAGE_SIZE: u64 = 500;

    pub const MIN_PASSWORD_LEN: usize = 8;
}
