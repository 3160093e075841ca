//! Utility to decrypt a captured bureau request document.
//!
//! Usage: `decrypt-payload <iv-hex> <encrypted-data-hex>`
//!
//! Uses `BUREAU_ENCRYPTION_SECRET` and `BUREAU_ENCRYPTION_SALT` from the
//! environment (or `.env`), the same values the API derives its key from.

use credit_analysis_api::crypto::{decrypt, TransmissionKey};
use credit_analysis_api::masking::mask_document;
use dotenvy::dotenv;
use std::env;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let [iv, data] = args.as_slice() else {
        anyhow::bail!("usage: decrypt-payload <iv-hex> <encrypted-data-hex>");
    };

    let secret = env::var("BUREAU_ENCRYPTION_SECRET")
        .map_err(|_| anyhow::anyhow!("BUREAU_ENCRYPTION_SECRET must be set"))?;
    let salt = env::var("BUREAU_ENCRYPTION_SALT")
        .map_err(|_| anyhow::anyhow!("BUREAU_ENCRYPTION_SALT must be set"))?;

    let key = TransmissionKey::derive(&secret, &salt)?;
    let plaintext = decrypt(data, iv, &key)?;

    // Print the masked form unless the operator explicitly asks for the raw value.
    if env::var("DECRYPT_SHOW_RAW").as_deref() == Ok("1") {
        println!("{}", plaintext);
    } else {
        println!("{}", mask_document(&plaintext));
    }

    Ok(())
}
