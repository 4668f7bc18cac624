use crate::security::FieldCipher;

pub fn cmd_generate_key() {
    println!("{}", FieldCipher::generate_key_hex());
    eprintln!();
    eprintln!("Set it as security.field_encryption_key or INVENTORY_FIELD_KEY.");
    eprintln!("Keep it safe: encrypted fields cannot be read without it.");
}
