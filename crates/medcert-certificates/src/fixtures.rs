// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared test fixtures: transaction #42, a TB screening bought by Acme
// Insurance from City Clinic.

use std::sync::Arc;

use age::x25519::Identity;
use chrono::{DateTime, TimeZone, Utc};

use medcert_core::types::{
    Certificate, CertificateId, CertificateMetadata, CertificateStatus, CertificateSubject,
    MedicalService, Money, Profile, ServiceId, Transaction, TransactionId, TransactionStatus,
    UserId, certificate_expiry,
};
use medcert_security::{DocumentVault, IssuerSigner};

use crate::admin::CertificateAdmin;
use crate::blob::MemoryBlobStore;
use crate::download::DocumentAccess;
use crate::orchestrator::CertificateIssuer;
use crate::sqlite::SqliteStore;
use crate::verifier::CertificateVerifier;

pub const SIGNING_SECRET: &[u8] = b"test-signing-secret-0123456789abcdef";

pub fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
}

pub fn completed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap()
}

/// Store holding service 7, profiles 100 and 200, and completed
/// transaction 42.
pub fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .insert_service(&MedicalService {
            id: ServiceId(7),
            seller_id: UserId(200),
            name: "Tuberculosis Screening".into(),
            description: "Chest radiograph with sputum smear microscopy.".into(),
            icd11_code: "1A01".into(),
            unit_price: Money::from_cents(5000),
        })
        .unwrap();
    store
        .insert_profile(&Profile {
            user_id: UserId(100),
            organization_name: "Acme Insurance".into(),
            contact_email: Some("claims@acme.example".into()),
        })
        .unwrap();
    store
        .insert_profile(&Profile {
            user_id: UserId(200),
            organization_name: "City Clinic".into(),
            contact_email: None,
        })
        .unwrap();
    insert_completed_transaction(&store, TransactionId(42), UserId(100), UserId(200));
    store
}

pub fn insert_completed_transaction(
    store: &SqliteStore,
    id: TransactionId,
    buyer: UserId,
    seller: UserId,
) {
    store
        .insert_transaction(&Transaction {
            id,
            buyer_id: buyer,
            seller_id: seller,
            service_id: ServiceId(7),
            quantity: 3,
            unit_price: Money::from_cents(5000),
            total_price: Money::from_cents(15000),
            status: TransactionStatus::Completed,
            created_at: completed_at() - chrono::TimeDelta::hours(1),
            completed_at: Some(completed_at()),
        })
        .unwrap();
}

pub fn insert_pending_transaction(store: &SqliteStore, id: TransactionId) {
    store
        .insert_transaction(&Transaction {
            id,
            buyer_id: UserId(100),
            seller_id: UserId(200),
            service_id: ServiceId(7),
            quantity: 3,
            unit_price: Money::from_cents(5000),
            total_price: Money::from_cents(15000),
            status: TransactionStatus::Pending,
            created_at: completed_at(),
            completed_at: None,
        })
        .unwrap();
}

/// A structurally complete certificate with placeholder artefacts, for
/// store-level tests.
pub fn bare_certificate(transaction_id: TransactionId, number: &str) -> Certificate {
    let issued = issued_at();
    Certificate {
        id: CertificateId::new(),
        certificate_number: number.to_owned(),
        status: CertificateStatus::Valid,
        issued_at: issued,
        expires_at: certificate_expiry(issued).unwrap(),
        subject: CertificateSubject {
            transaction_id,
            service_id: ServiceId(7),
            service_name: "Tuberculosis Screening".into(),
            service_description: String::new(),
            icd11_code: "1A01".into(),
            quantity: 3,
            unit_price: Money::from_cents(5000),
            total_price: Money::from_cents(15000),
            transaction_date: completed_at(),
            buyer_id: UserId(100),
            buyer_name: "Acme Insurance".into(),
            seller_id: UserId(200),
            seller_name: "City Clinic".into(),
        },
        qr_code_data: String::new(),
        qr_token: String::new(),
        pdf_hash: "00".repeat(32),
        verification_hash: "00".repeat(32),
        digital_signature: String::new(),
        encrypted_document_path: format!("certificates/{number}.pdf.enc"),
        metadata: CertificateMetadata {
            service_id: ServiceId(7),
            buyer_id: UserId(100),
            seller_id: UserId(200),
            generated_at: issued,
            canonical_version: 1,
            renderer_version: "medcert-pdf/2".into(),
            key_version: Some(1),
            document_encrypted: true,
        },
    }
}

/// Seeded store, in-memory blobs, one document key, one signing key.
pub struct TestEnv {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub vault: Arc<DocumentVault>,
    pub signer: Arc<IssuerSigner>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            store: Arc::new(seeded_store()),
            blobs: Arc::new(MemoryBlobStore::new()),
            vault: Arc::new(DocumentVault::new(1, Identity::generate())),
            signer: Arc::new(IssuerSigner::new("test", SIGNING_SECRET).unwrap()),
        }
    }

    pub fn issuer(&self) -> CertificateIssuer {
        CertificateIssuer::new(
            self.store.clone(),
            self.store.clone(),
            self.blobs.clone(),
            Some(self.vault.clone()),
            self.signer.clone(),
        )
    }

    pub fn verifier(&self) -> CertificateVerifier {
        CertificateVerifier::new(self.store.clone(), self.signer.clone())
    }

    pub fn access(&self) -> DocumentAccess {
        DocumentAccess::new(self.store.clone(), self.blobs.clone(), Some(self.vault.clone()))
    }

    pub fn admin(&self) -> CertificateAdmin {
        CertificateAdmin::new(self.store.clone())
    }

    /// Issue the scenario certificate at [`issued_at`].
    pub fn issue_scenario(&self) -> Certificate {
        self.issuer()
            .issue(TransactionId(42), issued_at())
            .unwrap()
            .certificate
    }
}
