//! Human-readable certificate dump with locale-specific labels and dates.

use std::fmt;

use ca_issuance::certificate::IssuedCertificate;
use ca_issuance::request::Request;
use chrono::{DateTime, Utc};

use super::{issued_for, Locale, OutputRenderer};

pub const VALUE_PRETTY_CERT: &str = "pretty_cert";

struct Labels {
    title: &'static str,
    version: &'static str,
    serial: &'static str,
    issuer: &'static str,
    subject: &'static str,
    validity: &'static str,
    not_before: &'static str,
    not_after: &'static str,
    fingerprint: &'static str,
    extensions: &'static str,
    critical: &'static str,
    yes: &'static str,
    no: &'static str,
    date_format: &'static str,
}

const EN: Labels = Labels {
    title: "Certificate",
    version: "Version",
    serial: "Serial Number",
    issuer: "Issuer",
    subject: "Subject",
    validity: "Validity",
    not_before: "Not Before",
    not_after: "Not After",
    fingerprint: "SHA-256 Fingerprint",
    extensions: "Extensions",
    critical: "critical",
    yes: "yes",
    no: "no",
    date_format: "%Y-%m-%d %H:%M:%S UTC",
};

const DE: Labels = Labels {
    title: "Zertifikat",
    version: "Version",
    serial: "Seriennummer",
    issuer: "Aussteller",
    subject: "Inhaber",
    validity: "Gültigkeit",
    not_before: "Nicht vor",
    not_after: "Nicht nach",
    fingerprint: "SHA-256-Fingerabdruck",
    extensions: "Erweiterungen",
    critical: "kritisch",
    yes: "ja",
    no: "nein",
    date_format: "%d.%m.%Y %H:%M:%S UTC",
};

const FR: Labels = Labels {
    title: "Certificat",
    version: "Version",
    serial: "Numéro de série",
    issuer: "Émetteur",
    subject: "Sujet",
    validity: "Validité",
    not_before: "Pas avant",
    not_after: "Pas après",
    fingerprint: "Empreinte SHA-256",
    extensions: "Extensions",
    critical: "critique",
    yes: "oui",
    no: "non",
    date_format: "%d/%m/%Y %H:%M:%S UTC",
};

fn labels(locale: Locale) -> &'static Labels {
    match locale {
        Locale::En => &EN,
        Locale::De => &DE,
        Locale::Fr => &FR,
    }
}

/// Human-readable certificate dump.
#[derive(Debug, Clone, Default)]
pub struct PrettyPrintOutput;

impl PrettyPrintOutput {
    pub fn new() -> Self {
        Self
    }

    pub fn render(cert: &IssuedCertificate, locale: Locale) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_dump(&mut out, cert, labels(locale));
        out
    }
}

fn write_dump(out: &mut impl fmt::Write, cert: &IssuedCertificate, l: &Labels) -> fmt::Result {
    let date = |t: &DateTime<Utc>| t.format(l.date_format).to_string();

    writeln!(out, "{}:", l.title)?;
    writeln!(out, "    {}: v{}", l.version, cert.version.number())?;
    writeln!(out, "    {}: 0x{:X}", l.serial, cert.serial_number)?;
    writeln!(out, "    {}: {}", l.issuer, cert.issuer_dn)?;
    writeln!(out, "    {}: {}", l.subject, cert.subject_dn)?;
    writeln!(out, "    {}:", l.validity)?;
    writeln!(out, "        {}: {}", l.not_before, date(&cert.not_before))?;
    writeln!(out, "        {}: {}", l.not_after, date(&cert.not_after))?;
    writeln!(out, "    {}: {}", l.fingerprint, cert.fingerprint_hex())?;
    if cert.extensions.is_empty() {
        return Ok(());
    }
    writeln!(out, "    {}:", l.extensions)?;
    for ext in cert.extensions.iter() {
        let critical = if ext.is_critical() { l.yes } else { l.no };
        writeln!(
            out,
            "        {} ({}), {}: {}",
            ext.name(),
            ext.oid(),
            l.critical,
            critical
        )?;
    }
    Ok(())
}

impl OutputRenderer for PrettyPrintOutput {
    fn display_name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => "Certificate Pretty Print",
            Locale::De => "Zertifikatsanzeige",
            Locale::Fr => "Affichage du certificat",
        }
    }

    fn value_names(&self) -> &'static [&'static str] {
        &[VALUE_PRETTY_CERT]
    }

    fn value(&self, name: &str, locale: Locale, request: &Request) -> Option<String> {
        let cert = issued_for(name, VALUE_PRETTY_CERT, request)?;
        Some(Self::render(cert, locale))
    }
}
