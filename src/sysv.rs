use crate::addressing::Tag;
use crate::error::ChannelError;
use crate::mailbox::{Mailbox, Message, PAYLOAD_SIZE, Payload};
use std::io;

/// Wire layout expected by `msgsnd`/`msgrcv`: a `long` type followed by the
/// text. The tag travels as `mtype`.
#[repr(C)]
struct RawMessage {
    mtype: libc::c_long,
    mtext: [u8; PAYLOAD_SIZE],
}

/// A mailbox backed by a System V message queue.
///
/// The queue lives in the kernel and is shared by every process that knows
/// its id; `msgrcv` with a positive `msgtyp` gives exact-tag selective
/// receive for free. Dropping a `SysvMailbox` only forgets the id; the queue
/// itself disappears on [`Mailbox::destroy`].
///
/// After the queue has been removed, blocked receivers wake up with `EIDRM`
/// and later calls fail with `EINVAL`. Both map to
/// [`ChannelError::TornDown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysvMailbox {
    id: libc::c_int,
}

impl SysvMailbox {
    /// Creates the queue for `key`, or attaches to it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unavailable`] if `msgget` fails.
    pub fn create_or_attach(key: libc::key_t) -> Result<Self, ChannelError> {
        let id = unsafe { libc::msgget(key, 0o600 | libc::IPC_CREAT) };
        if id == -1 {
            return Err(ChannelError::Unavailable {
                key,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { id })
    }

    /// Creates a fresh queue nobody else can find by key.
    pub fn create_private() -> Result<Self, ChannelError> {
        Self::create_or_attach(libc::IPC_PRIVATE)
    }

    /// Attaches to an existing queue by id, checking that it exists.
    pub fn attach(id: libc::c_int) -> Result<Self, ChannelError> {
        let mut ds: libc::msqid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::msgctl(id, libc::IPC_STAT, &mut ds) } == -1 {
            return Err(ChannelError::Attach {
                id,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { id })
    }

    /// The key the original table used: the calling user's uid.
    pub fn default_key() -> libc::key_t {
        unsafe { libc::getuid() as libc::key_t }
    }

    /// Kernel id of the queue, as passed to other processes.
    pub fn id(&self) -> libc::c_int {
        self.id
    }
}

/// `true` if `err` means the queue no longer exists.
fn is_removed(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EIDRM) | Some(libc::EINVAL))
}

impl Mailbox for SysvMailbox {
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError> {
        let msg = RawMessage {
            mtype: tag.raw() as libc::c_long,
            mtext: *payload.as_bytes(),
        };
        loop {
            let rc = unsafe {
                libc::msgsnd(
                    self.id,
                    (&msg as *const RawMessage).cast(),
                    payload.wire_len(),
                    0,
                )
            };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                _ if is_removed(&err) => return Err(ChannelError::TornDown { tag }),
                _ => return Err(ChannelError::Send { tag, source: err }),
            }
        }
    }

    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError> {
        let mut msg = RawMessage {
            mtype: 0,
            mtext: [0u8; PAYLOAD_SIZE],
        };
        loop {
            let n = unsafe {
                libc::msgrcv(
                    self.id,
                    (&mut msg as *mut RawMessage).cast(),
                    PAYLOAD_SIZE,
                    tag.raw() as libc::c_long,
                    0,
                )
            };
            if n >= 0 {
                debug_assert_eq!(msg.mtype, tag.raw() as libc::c_long);
                return Ok(Message {
                    tag,
                    payload: Payload::from_bytes(&msg.mtext[..n as usize]),
                });
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                _ if is_removed(&err) => return Err(ChannelError::TornDown { tag }),
                _ => return Err(ChannelError::Receive { tag, source: err }),
            }
        }
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        if unsafe { libc::msgctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) } == -1 {
            return Err(ChannelError::Destroy {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}
