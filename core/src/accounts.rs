//! Seller and delivery partner accounts.
//!
//! Registration stores the account unverified and emails a signed link. The
//! link carries a token whose subject is `seller:<id>` or `partner:<id>`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::{AppConfig, LifecycleConfig};
use crate::environment::Clock;
use crate::error::{Result, ShipmentError};
use crate::providers::{NotificationSink, OutboundMessage, PartnerRepository, SellerRepository};
use crate::token::{TokenCodec, TokenPurpose};
use crate::types::{Account, DeliveryPartner, PartnerId, Seller, SellerId};
use crate::utils::{self, NAME_LEN};

/// Template used for verification emails.
pub const VERIFY_TEMPLATE: &str = "mail_email_verify.html";

/// Seller sign-up payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSeller {
    /// Display name (3 to 50 characters)
    pub name: String,
    /// Contact email
    pub email: String,
    /// Zip code where shipments are handed over
    pub zip_code: u32,
    /// Street address
    pub address: Option<String>,
}

/// Delivery partner sign-up payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPartner {
    /// Display name (3 to 50 characters)
    pub name: String,
    /// Contact email
    pub email: String,
    /// Destination zip codes served
    pub serviceable_zip_codes: BTreeSet<u32>,
    /// Maximum number of active shipments
    pub max_handling_capacity: u32,
}

/// Partner profile changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerPatch {
    /// Replacement set of serviceable zip codes
    pub serviceable_zip_codes: Option<BTreeSet<u32>>,
    /// Replacement capacity
    pub max_handling_capacity: Option<u32>,
}

impl PartnerPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.serviceable_zip_codes.is_none() && self.max_handling_capacity.is_none()
    }
}

/// The account a verification token pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedAccount {
    /// A seller
    Seller(Seller),
    /// A delivery partner
    Partner(DeliveryPartner),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountRef {
    Seller(SellerId),
    Partner(PartnerId),
}

impl AccountRef {
    fn subject(self) -> String {
        match self {
            Self::Seller(id) => format!("seller:{id}"),
            Self::Partner(id) => format!("partner:{id}"),
        }
    }

    fn parse(subject: &str) -> Option<Self> {
        let (kind, id) = subject.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "seller" => Some(Self::Seller(SellerId::from_uuid(id))),
            "partner" => Some(Self::Partner(PartnerId::from_uuid(id))),
            _ => None,
        }
    }

    const fn route(self) -> &'static str {
        match self {
            Self::Seller(_) => "seller",
            Self::Partner(_) => "partner",
        }
    }
}

/// Account registration and maintenance.
pub struct AccountsService<R, N> {
    repo: R,
    sink: N,
    tokens: TokenCodec,
    app: AppConfig,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl<R, N> AccountsService<R, N>
where
    R: SellerRepository + PartnerRepository,
    N: NotificationSink,
{
    /// Create the service.
    #[must_use]
    pub fn new(
        repo: R,
        sink: N,
        tokens: TokenCodec,
        app: AppConfig,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            repo,
            sink,
            tokens,
            app,
            clock,
            config,
        }
    }

    fn new_account<Id>(&self, id: Id, name: &str, email: &str) -> Result<Account<Id>> {
        let name = name.trim();
        utils::check_len("name", name, NAME_LEN)?;
        let email = email.trim().to_lowercase();
        utils::check_email("email", &email)?;

        Ok(Account {
            id,
            name: name.to_string(),
            email,
            email_verified: false,
            created_at: self.clock.now(),
        })
    }

    /// Register a seller and send the verification email.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Name or email is invalid → `ValidationError`
    /// - Email already registered → `Conflict`
    /// - The repository fails
    pub async fn register_seller(&self, request: RegisterSeller) -> Result<Seller> {
        let seller = Seller {
            account: self.new_account(SellerId::new(), &request.name, &request.email)?,
            zip_code: request.zip_code,
            address: request
                .address
                .map(|address| address.trim().to_string())
                .filter(|address| !address.is_empty()),
        };

        self.repo.insert_seller(&seller).await?;
        tracing::info!(seller_id = %seller.id(), "Seller registered");

        self.send_verification(AccountRef::Seller(seller.id()), &seller.account);
        Ok(seller)
    }

    /// Register a delivery partner and send the verification email.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Name or email is invalid, or no zip code is served → `ValidationError`
    /// - Email already registered → `Conflict`
    /// - The repository fails
    pub async fn register_partner(&self, request: RegisterPartner) -> Result<DeliveryPartner> {
        if request.serviceable_zip_codes.is_empty() {
            return Err(ShipmentError::ValidationError(
                "at least one serviceable zip code is required".into(),
            ));
        }

        let partner = DeliveryPartner {
            account: self.new_account(PartnerId::new(), &request.name, &request.email)?,
            serviceable_zip_codes: request.serviceable_zip_codes,
            max_handling_capacity: request.max_handling_capacity,
        };

        self.repo.insert_partner(&partner).await?;
        tracing::info!(
            partner_id = %partner.id(),
            zip_codes = partner.serviceable_zip_codes.len(),
            capacity = partner.max_handling_capacity,
            "Delivery partner registered"
        );

        self.send_verification(AccountRef::Partner(partner.id()), &partner.account);
        Ok(partner)
    }

    fn send_verification<Id>(&self, account: AccountRef, details: &Account<Id>) {
        let token = match self
            .tokens
            .encode(TokenPurpose::EmailVerification, &account.subject(), self.clock.now())
        {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to issue email verification token");
                return;
            }
        };

        let url = format!(
            "{}/{}/verify?token={token}",
            self.app.base_url(),
            account.route()
        );

        let message = OutboundMessage::TemplatedEmail {
            to: details.email.clone(),
            subject: "Verify your email".to_string(),
            template: VERIFY_TEMPLATE.to_string(),
            context: json!({
                "username": details.name,
                "url": url,
            }),
        };
        if let Err(e) = self.sink.enqueue(message) {
            tracing::warn!(error = %e, "Failed to queue verification email");
        }
    }

    /// Mark the account behind a verification token as verified.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The token is invalid or expired → `Unauthorized`
    /// - The account no longer exists → `NotFound`
    /// - The repository fails
    pub async fn verify_email(&self, token: &str) -> Result<VerifiedAccount> {
        let subject = self.tokens.decode(
            token,
            TokenPurpose::EmailVerification,
            self.config.email_token_max_age(),
            self.clock.now(),
        )?;
        let account = AccountRef::parse(&subject).ok_or(ShipmentError::Unauthorized)?;

        let verified = match account {
            AccountRef::Seller(id) => {
                if !self.repo.set_seller_email_verified(id).await? {
                    return Err(ShipmentError::not_found("seller", id));
                }
                let seller = self
                    .repo
                    .get_seller(id)
                    .await?
                    .ok_or_else(|| ShipmentError::not_found("seller", id))?;
                VerifiedAccount::Seller(seller)
            }
            AccountRef::Partner(id) => {
                if !self.repo.set_partner_email_verified(id).await? {
                    return Err(ShipmentError::not_found("partner", id));
                }
                let partner = self
                    .repo
                    .get_partner(id)
                    .await?
                    .ok_or_else(|| ShipmentError::not_found("partner", id))?;
                VerifiedAccount::Partner(partner)
            }
        };

        tracing::info!(account = %subject, "Email verified");
        Ok(verified)
    }

    /// Change a partner's serviceable zip codes and/or capacity.
    ///
    /// Lowering capacity below the current active count is allowed. The
    /// partner simply receives nothing new until shipments complete.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The patch is empty or clears every zip code → `ValidationError`
    /// - Unknown partner → `NotFound`
    /// - The repository fails
    pub async fn update_partner(
        &self,
        partner_id: PartnerId,
        patch: PartnerPatch,
    ) -> Result<DeliveryPartner> {
        if patch.is_empty() {
            return Err(ShipmentError::ValidationError(
                "update must change at least one field".into(),
            ));
        }

        let mut partner = self
            .repo
            .get_partner(partner_id)
            .await?
            .ok_or_else(|| ShipmentError::not_found("partner", partner_id))?;

        if let Some(zip_codes) = patch.serviceable_zip_codes {
            if zip_codes.is_empty() {
                return Err(ShipmentError::ValidationError(
                    "at least one serviceable zip code is required".into(),
                ));
            }
            partner.serviceable_zip_codes = zip_codes;
        }
        if let Some(capacity) = patch.max_handling_capacity {
            partner.max_handling_capacity = capacity;
        }

        self.repo.update_partner(&partner).await?;
        tracing::info!(
            %partner_id,
            zip_codes = partner.serviceable_zip_codes.len(),
            capacity = partner.max_handling_capacity,
            "Delivery partner updated"
        );
        Ok(partner)
    }
}
