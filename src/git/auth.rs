//! Credential and certificate handling for clone and push.
//!
//! Both concerns are pluggable. The defaults are [`SshAgentCredentials`],
//! which asks the local ssh-agent for a key and never prompts, and
//! [`SystemCertificates`], which leaves certificate validation to libgit2.
//!
//! [`AcceptAnyCertificate`] reproduces the historical behaviour of trusting
//! every host certificate. It disables transport security and is only
//! enabled on explicit request; each use is logged at `warn`.

use git2::cert::Cert;
use git2::{CertificateCheckStatus, Cred, CredentialType, RemoteCallbacks};

/// How many times the credential provider may be asked during one
/// clone or push. libgit2 retries forever while the remote rejects keys.
pub const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// User name offered to ssh when the remote URL carries none.
const DEFAULT_SSH_USER: &str = "git";

/// Supplies key material for a remote connection without user interaction.
pub trait CredentialProvider {
    fn resolve(
        &self,
        url: &str,
        username: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error>;
}

/// Decides whether a remote's host certificate is acceptable.
pub trait CertificateValidator {
    fn check(&self, cert: &Cert<'_>, host: &str) -> Result<CertificateCheckStatus, git2::Error>;
}

/// Resolve keys exclusively through the local ssh-agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshAgentCredentials;

impl CredentialProvider for SshAgentCredentials {
    fn resolve(
        &self,
        url: &str,
        username: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        let user = username.unwrap_or(DEFAULT_SSH_USER);

        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(user);
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            log::debug!("requesting ssh-agent key for {}@{}", user, url);
            return Cred::ssh_key_from_agent(user);
        }

        Err(git2::Error::from_str(&format!(
            "no non-interactive credentials available for {} (remote accepts {:?})",
            url, allowed
        )))
    }
}

/// Defer to libgit2's own certificate validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCertificates;

impl CertificateValidator for SystemCertificates {
    fn check(&self, _cert: &Cert<'_>, _host: &str) -> Result<CertificateCheckStatus, git2::Error> {
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

/// Trust every certificate. Insecure.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyCertificate;

impl CertificateValidator for AcceptAnyCertificate {
    fn check(&self, _cert: &Cert<'_>, host: &str) -> Result<CertificateCheckStatus, git2::Error> {
        log::warn!(
            "accepting the certificate of {} without validation; the connection is not authenticated",
            host
        );
        Ok(CertificateCheckStatus::CertificateOk)
    }
}

/// Counts credential requests and stops once the limit is reached.
#[derive(Debug, Default)]
pub(crate) struct CredentialAttempts {
    count: u32,
}

impl CredentialAttempts {
    pub(crate) fn next(
        &mut self,
        provider: &dyn CredentialProvider,
        url: &str,
        username: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        self.count += 1;
        if self.count > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str(&format!(
                "authentication to {} failed after {} attempts",
                url, MAX_CREDENTIAL_ATTEMPTS
            )));
        }
        log::debug!(
            "credential request {} for {} (user: {:?}, allowed: {:?})",
            self.count,
            url,
            username,
            allowed
        );
        provider.resolve(url, username, allowed)
    }
}

/// The credential and certificate strategies used for every remote operation.
pub struct RemoteAuth {
    credentials: Box<dyn CredentialProvider>,
    certificates: Box<dyn CertificateValidator>,
}

impl Default for RemoteAuth {
    fn default() -> Self {
        Self::new(SshAgentCredentials, SystemCertificates)
    }
}

impl RemoteAuth {
    pub fn new(
        credentials: impl CredentialProvider + 'static,
        certificates: impl CertificateValidator + 'static,
    ) -> Self {
        Self {
            credentials: Box::new(credentials),
            certificates: Box::new(certificates),
        }
    }

    /// Swap the certificate strategy.
    pub fn with_certificates(mut self, certificates: impl CertificateValidator + 'static) -> Self {
        self.certificates = Box::new(certificates);
        self
    }

    /// Fresh callbacks for one network operation.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut attempts = CredentialAttempts::default();
        let credentials = self.credentials.as_ref();
        let certificates = self.certificates.as_ref();

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed| {
            attempts.next(credentials, url, username, allowed)
        });
        callbacks.certificate_check(move |cert, host| certificates.check(cert, host));
        callbacks
    }
}
