//! Ownership overrides and user/group identity resolution.

use crate::entry::Entry;
use crate::error::{Error, Result};
use nix::unistd::{Gid, Group, Uid, User};

/// Name/id lookups against a user and group database.
///
/// `Ok(None)` means the database has no such entry.
pub trait IdentityResolver {
    /// Look up the user name for a numeric id.
    fn user_name(&self, uid: u64) -> Result<Option<String>>;
    /// Look up the numeric id for a user name.
    fn user_id(&self, name: &str) -> Result<Option<u64>>;
    /// Look up the group name for a numeric id.
    fn group_name(&self, gid: u64) -> Result<Option<String>>;
    /// Look up the numeric id for a group name.
    fn group_id(&self, name: &str) -> Result<Option<u64>>;
    /// Identity of the running process.
    fn current(&self) -> Result<Identity>;
}

/// A resolved user/group identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: u64,
    pub uname: String,
    pub gid: u64,
    pub gname: String,
}

/// Resolver backed by the OS user and group database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

fn to_raw_id(id: u64) -> Option<u32> {
    u32::try_from(id).ok()
}

impl IdentityResolver for SystemResolver {
    fn user_name(&self, uid: u64) -> Result<Option<String>> {
        let Some(raw) = to_raw_id(uid) else {
            return Ok(None);
        };
        Ok(User::from_uid(Uid::from_raw(raw))?.map(|user| user.name))
    }

    fn user_id(&self, name: &str) -> Result<Option<u64>> {
        Ok(User::from_name(name)?.map(|user| u64::from(user.uid.as_raw())))
    }

    fn group_name(&self, gid: u64) -> Result<Option<String>> {
        let Some(raw) = to_raw_id(gid) else {
            return Ok(None);
        };
        Ok(Group::from_gid(Gid::from_raw(raw))?.map(|group| group.name))
    }

    fn group_id(&self, name: &str) -> Result<Option<u64>> {
        Ok(Group::from_name(name)?.map(|group| u64::from(group.gid.as_raw())))
    }

    fn current(&self) -> Result<Identity> {
        let uid = Uid::current();
        let user = User::from_uid(uid)?.ok_or_else(|| Error::unknown_user(uid))?;
        let group = Group::from_gid(user.gid)?.ok_or_else(|| Error::unknown_group(user.gid))?;

        Ok(Identity {
            uid: u64::from(user.uid.as_raw()),
            uname: user.name,
            gid: u64::from(group.gid.as_raw()),
            gname: group.name,
        })
    }
}

/// Ownership override as requested by the caller.
///
/// Each field is independently optional. Call [`Ownership::resolve`] once
/// per archive to fill in the missing half of each id/name pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<u64>,
    pub uname: Option<String>,
    pub gid: Option<u64>,
    pub gname: Option<String>,
}

/// Ownership override after id/name pairing, applied to every written entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOwnership {
    uid: Option<u64>,
    uname: Option<String>,
    gid: Option<u64>,
    gname: Option<String>,
}

impl Ownership {
    /// Complete each id/name pair from the other half.
    ///
    /// If only `uid` is set, `uname` is looked up, and vice versa; the same
    /// applies to `gid`/`gname`. Fields set explicitly are never replaced.
    pub fn resolve(self, resolver: &dyn IdentityResolver) -> Result<ResolvedOwnership> {
        let (uid, uname) = complete_pair(
            self.uid,
            self.uname,
            |name| resolver.user_id(name)?.ok_or_else(|| Error::unknown_user(name)),
            |id| resolver.user_name(id)?.ok_or_else(|| Error::unknown_user(id)),
        )?;
        let (gid, gname) = complete_pair(
            self.gid,
            self.gname,
            |name| resolver.group_id(name)?.ok_or_else(|| Error::unknown_group(name)),
            |id| resolver.group_name(id)?.ok_or_else(|| Error::unknown_group(id)),
        )?;

        Ok(ResolvedOwnership {
            uid,
            uname,
            gid,
            gname,
        })
    }
}

/// Fill in whichever half of an id/name pair is missing.
fn complete_pair(
    id: Option<u64>,
    name: Option<String>,
    id_of: impl FnOnce(&str) -> Result<u64>,
    name_of: impl FnOnce(u64) -> Result<String>,
) -> Result<(Option<u64>, Option<String>)> {
    match (id, name) {
        (None, Some(name)) => Ok((Some(id_of(&name)?), Some(name))),
        (Some(id), None) => Ok((Some(id), Some(name_of(id)?))),
        pair => Ok(pair),
    }
}

impl ResolvedOwnership {
    /// Whether no field is overridden.
    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.uname.is_none() && self.gid.is_none() && self.gname.is_none()
    }

    /// Apply the override to an entry's natural metadata.
    ///
    /// Overridden fields win; everything else keeps the natural value.
    pub fn apply(&self, mut entry: Entry) -> Entry {
        if let Some(uid) = self.uid {
            entry.uid = uid;
        }
        if let Some(uname) = &self.uname {
            entry.uname = Some(uname.clone());
        }
        if let Some(gid) = self.gid {
            entry.gid = gid;
        }
        if let Some(gname) = &self.gname {
            entry.gname = Some(gname.clone());
        }
        entry
    }

    /// Metadata for an entry synthesized by the builder.
    ///
    /// Entries with no filesystem source take the running process identity
    /// as their natural owner before the override is applied.
    pub fn apply_synthesized(&self, mut entry: Entry, process: &Identity) -> Entry {
        entry.uid = process.uid;
        entry.uname = Some(process.uname.clone());
        entry.gid = process.gid;
        entry.gname = Some(process.gname.clone());
        self.apply(entry)
    }
}
