//! The transition table of the provisioning dialog.
//!
//! Each inbound message is classified by its reason code crossed with the
//! session's current step; the table is a pure function of that pair plus
//! the firmware-pending flag and the phone's accept/reject verdict.

use std::fmt;

/// Server-side expectation of what the phone will be told next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvStep {
    /// No contact yet.
    #[default]
    Initial,
    /// ContactMe was sent; waiting for the phone to call in. Reserved,
    /// never entered by the table.
    WaitForSolicited,
    /// Send the system configuration. Reserved; start-up and solicited
    /// contacts are answered with configuration directly.
    SendConfig,
    /// Send deployment files, excluding software.
    SendFiles,
    /// Send a software update.
    SendSoftware,
    /// Software was sent; waiting for the phone to come back.
    WaitForUpdate,
    /// Request the phone's live configuration.
    RequestConfig,
}

impl fmt::Display for ProvStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvStep::Initial => "Initial",
            ProvStep::WaitForSolicited => "WaitForSolicited",
            ProvStep::SendConfig => "SendConfig",
            ProvStep::SendFiles => "SendFiles",
            ProvStep::SendSoftware => "SendSoftware",
            ProvStep::WaitForUpdate => "WaitForUpdate",
            ProvStep::RequestConfig => "RequestConfig",
        };
        f.write_str(name)
    }
}

/// Inbound reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    StartUp,
    Solicited,
    ReplyTo,
    Status,
    LocalChanges,
    /// Anything we do not implement.
    Other,
}

impl Reason {
    pub fn parse(code: &str) -> Self {
        match code {
            "start-up" => Reason::StartUp,
            "solicited" => Reason::Solicited,
            "reply-to" => Reason::ReplyTo,
            "status" => Reason::Status,
            "local-changes" => Reason::LocalChanges,
            _ => Reason::Other,
        }
    }
}

/// Outbound action builders the table can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builder {
    SendConfig,
    SendFiles,
    SendSoftware,
    ReadAllItems,
}

/// What the handler must do for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Answer with the builder's items, then expect `next`.
    Respond { builder: Builder, next: ProvStep },
    /// Provisioning finished; drop the session record.
    Finish,
    /// Log only: no reply, record untouched.
    Ignore,
}

/// Decide the next action from reason, current step, whether a firmware
/// update is pending, and whether the phone accepted the previous step.
pub fn decide(reason: Reason, step: ProvStep, fw_needs_update: bool, accepted: bool) -> Decision {
    match reason {
        // The phone rebooted after a software push: the update took, read
        // the resulting configuration back.
        Reason::StartUp if step == ProvStep::WaitForUpdate => Decision::Respond {
            builder: Builder::ReadAllItems,
            next: ProvStep::RequestConfig,
        },
        // Both a fresh boot and an explicit solicitation get the full
        // configuration.
        Reason::StartUp | Reason::Solicited => Decision::Respond {
            builder: Builder::SendConfig,
            next: ProvStep::SendFiles,
        },
        Reason::ReplyTo if !accepted => Decision::Ignore,
        Reason::ReplyTo if step == ProvStep::SendFiles => Decision::Respond {
            builder: Builder::SendFiles,
            next: if fw_needs_update {
                ProvStep::SendSoftware
            } else {
                ProvStep::RequestConfig
            },
        },
        Reason::ReplyTo if step == ProvStep::RequestConfig => Decision::Finish,
        Reason::ReplyTo => Decision::Ignore,
        Reason::Status if step == ProvStep::SendSoftware => Decision::Respond {
            builder: Builder::SendSoftware,
            next: ProvStep::WaitForUpdate,
        },
        Reason::Status if step == ProvStep::RequestConfig => Decision::Respond {
            builder: Builder::ReadAllItems,
            next: ProvStep::RequestConfig,
        },
        Reason::Status => Decision::Ignore,
        Reason::LocalChanges => Decision::Ignore,
        Reason::Other => Decision::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STEPS: [ProvStep; 7] = [
        ProvStep::Initial,
        ProvStep::WaitForSolicited,
        ProvStep::SendConfig,
        ProvStep::SendFiles,
        ProvStep::SendSoftware,
        ProvStep::WaitForUpdate,
        ProvStep::RequestConfig,
    ];

    #[test]
    fn startup_after_update_reads_configuration_back() {
        assert_eq!(
            decide(Reason::StartUp, ProvStep::WaitForUpdate, false, false),
            Decision::Respond {
                builder: Builder::ReadAllItems,
                next: ProvStep::RequestConfig,
            }
        );
    }

    #[test]
    fn startup_and_solicited_send_configuration() {
        for step in ALL_STEPS {
            if step == ProvStep::WaitForUpdate {
                continue;
            }
            for reason in [Reason::StartUp, Reason::Solicited] {
                assert_eq!(
                    decide(reason, step, true, false),
                    Decision::Respond {
                        builder: Builder::SendConfig,
                        next: ProvStep::SendFiles,
                    }
                );
            }
        }
        // solicited ignores WaitForUpdate, only start-up resumes there
        assert_eq!(
            decide(Reason::Solicited, ProvStep::WaitForUpdate, false, false),
            Decision::Respond {
                builder: Builder::SendConfig,
                next: ProvStep::SendFiles,
            }
        );
    }

    #[test]
    fn accepted_reply_advances_to_files_then_branches_on_firmware() {
        assert_eq!(
            decide(Reason::ReplyTo, ProvStep::SendFiles, false, true),
            Decision::Respond {
                builder: Builder::SendFiles,
                next: ProvStep::RequestConfig,
            }
        );
        assert_eq!(
            decide(Reason::ReplyTo, ProvStep::SendFiles, true, true),
            Decision::Respond {
                builder: Builder::SendFiles,
                next: ProvStep::SendSoftware,
            }
        );
    }

    #[test]
    fn accepted_reply_at_request_config_is_terminal() {
        assert_eq!(
            decide(Reason::ReplyTo, ProvStep::RequestConfig, false, true),
            Decision::Finish
        );
    }

    #[test]
    fn rejected_reply_aborts_without_touching_the_record() {
        for step in ALL_STEPS {
            assert_eq!(decide(Reason::ReplyTo, step, true, false), Decision::Ignore);
        }
    }

    #[test]
    fn status_drives_software_and_readback() {
        assert_eq!(
            decide(Reason::Status, ProvStep::SendSoftware, true, true),
            Decision::Respond {
                builder: Builder::SendSoftware,
                next: ProvStep::WaitForUpdate,
            }
        );
        assert_eq!(
            decide(Reason::Status, ProvStep::RequestConfig, false, true),
            Decision::Respond {
                builder: Builder::ReadAllItems,
                next: ProvStep::RequestConfig,
            }
        );
        assert_eq!(
            decide(Reason::Status, ProvStep::SendFiles, false, true),
            Decision::Ignore
        );
    }

    #[test]
    fn local_changes_and_unknown_reasons_are_ignored() {
        for step in ALL_STEPS {
            assert_eq!(
                decide(Reason::LocalChanges, step, false, false),
                Decision::Ignore
            );
            assert_eq!(decide(Reason::Other, step, true, true), Decision::Ignore);
        }
    }

    #[test]
    fn reason_codes_parse() {
        assert_eq!(Reason::parse("start-up"), Reason::StartUp);
        assert_eq!(Reason::parse("solicited"), Reason::Solicited);
        assert_eq!(Reason::parse("reply-to"), Reason::ReplyTo);
        assert_eq!(Reason::parse("status"), Reason::Status);
        assert_eq!(Reason::parse("local-changes"), Reason::LocalChanges);
        assert_eq!(Reason::parse("shutdown"), Reason::Other);
        assert_eq!(Reason::parse(""), Reason::Other);
    }
}
