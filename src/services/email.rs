use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    /// Wraps inner HTML content in the Al-Murattal email layout.
    fn wrap_html(content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>Al-Murattal Institute</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:520px">
          <tr>
            <td align="center" style="padding-bottom:28px">
              <p style="margin:0;font-size:20px;font-weight:700;color:#0f172a;text-align:center">Al-Murattal Institute</p>
            </td>
          </tr>
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px;box-shadow:0 1px 3px rgba(0,0,0,0.08),0 8px 24px rgba(0,0,0,0.04)">
              {content}
            </td>
          </tr>
          <tr>
            <td align="center" style="padding-top:20px">
              <p style="margin:0;font-size:12px;color:#94a3b8">Global Directory of Qur'an Schools</p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    async fn send_email(
        &self,
        to: Mailbox,
        subject: &str,
        text: &str,
        html: &str,
    ) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )?;

        self.transport.send(email).await?;
        Ok(())
    }

    /// Invitation email for admin roles.
    pub async fn send_invitation(
        &self,
        to: &str,
        invite_url: &str,
        role: &str,
    ) -> anyhow::Result<()> {
        let to: Mailbox = to.parse()?;
        let subject = "You have been invited to Al-Murattal";
        let text = format!(
            "You have been invited to join the Al-Murattal verification network as {role}.\n\n\
             Create your account: {invite_url}\n\n\
             This link expires in 7 days."
        );
        let html = Self::wrap_html(&format!(
            r#"<p style="margin:0 0 16px;font-size:15px;color:#0f172a">You have been invited to join the Al-Murattal verification network as <strong>{role}</strong>.</p>
<p style="margin:0 0 24px"><a href="{invite_url}" style="display:inline-block;background:#0f766e;color:#ffffff;text-decoration:none;padding:12px 24px;border-radius:8px;font-weight:600">Create your account</a></p>
<p style="margin:0;font-size:13px;color:#64748b">This link expires in 7 days.</p>"#
        ));
        self.send_email(to, subject, &text, &html).await
    }

    /// Password reset link, valid for one hour.
    pub async fn send_password_reset(
        &self,
        to: &str,
        full_name: &str,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        let to: Mailbox = to.parse()?;
        let subject = "Reset your Al-Murattal password";
        let text = format!(
            "Hello {full_name},\n\n\
             A password reset was requested for your Al-Murattal account.\n\n\
             Create a new password: {reset_url}\n\n\
             This link expires in 1 hour. If you did not request this, ignore this email."
        );
        let html = Self::wrap_html(&format!(
            r#"<p style="margin:0 0 16px;font-size:15px;color:#0f172a">Hello <strong>{full_name}</strong>, a password reset was requested for your Al-Murattal account.</p>
<p style="margin:0 0 24px"><a href="{reset_url}" style="display:inline-block;background:#0f766e;color:#ffffff;text-decoration:none;padding:12px 24px;border-radius:8px;font-weight:600">Create a new password</a></p>
<p style="margin:0;font-size:13px;color:#64748b">This link expires in 1 hour. If you did not request this, ignore this email.</p>"#
        ));
        self.send_email(to, subject, &text, &html).await
    }

    /// Receipt sent to the school contact when an application is submitted.
    pub async fn send_submission_receipt(
        &self,
        to: &str,
        school_name: &str,
    ) -> anyhow::Result<()> {
        let to: Mailbox = to.parse()?;
        let subject = format!("KYS application received — {school_name}");
        let text = format!(
            "Your Know-Your-School application for {school_name} has been received.\n\n\
             It now enters country review, the first of three verification stages.\n\
             You will be notified at each stage."
        );
        let html = Self::wrap_html(&format!(
            r#"<p style="margin:0 0 16px;font-size:15px;color:#0f172a">Your Know-Your-School application for <strong>{school_name}</strong> has been received.</p>
<p style="margin:0;font-size:14px;color:#334155">It now enters country review, the first of three verification stages. You will be notified at each stage.</p>"#
        ));
        self.send_email(to, &subject, &text, &html).await
    }

    /// Notification sent to the school contact when a stage is decided.
    pub async fn send_decision_notification(
        &self,
        to: &str,
        school_name: &str,
        stage: &str,
        approved: bool,
        comments: Option<&str>,
    ) -> anyhow::Result<()> {
        let to: Mailbox = to.parse()?;
        let verdict = if approved { "approved" } else { "rejected" };
        let subject = format!("KYS {stage} stage {verdict} — {school_name}");
        let comment_line = comments
            .map(|c| format!("\n\nReviewer comments: {c}"))
            .unwrap_or_default();
        let text = format!(
            "The {stage} verification stage for {school_name} has been {verdict}.{comment_line}"
        );
        let comment_html = comments
            .map(|c| {
                format!(
                    r#"<p style="margin:16px 0 0;font-size:14px;color:#334155">Reviewer comments: {c}</p>"#
                )
            })
            .unwrap_or_default();
        let html = Self::wrap_html(&format!(
            r#"<p style="margin:0;font-size:15px;color:#0f172a">The <strong>{stage}</strong> verification stage for <strong>{school_name}</strong> has been <strong>{verdict}</strong>.</p>{comment_html}"#
        ));
        self.send_email(to, &subject, &text, &html).await
    }
}
