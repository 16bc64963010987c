use crate::commands::Out;
use crate::model::{phone_key, User};
use crate::store::RecordStore;
use crate::Result;
use anyhow::bail;

/// Registers a user in the sheet (when authorized and not already present) and the local cache.
///
/// # Errors
/// Returns an error if either field is blank or the local cache cannot be written.
pub async fn user_add(store: &RecordStore, name: &str, phone: &str) -> Result<Out<User>> {
    let (name, phone) = (name.trim(), phone.trim());
    if name.is_empty() || phone.is_empty() {
        bail!("Both a name and a phone number are required");
    }
    let user = User::new(name, phone);
    if !store.initialize_user(&user).await {
        bail!("Unable to record user {phone} in the local cache");
    }
    Ok(Out::new(format!("Registered {name} ({phone})"), user))
}

/// Lists every user, or only the one whose phone matches `phone`.
pub async fn users(store: &RecordStore, phone: Option<&str>) -> Result<Out<Vec<User>>> {
    let mut users = store.get_all_users().await;
    if let Some(phone) = phone {
        let key = phone_key(phone);
        users.retain(|u| u.phone_key() == key);
    }
    Ok(Out::new(format!("Found {} user(s)", users.len()), users))
}
