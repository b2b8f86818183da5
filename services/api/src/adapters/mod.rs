pub mod db;
pub mod google_identity;
pub mod prodia;

pub use db::DbAdapter;
pub use google_identity::GoogleIdentityVerifier;
pub use prodia::ProdiaAdapter;
