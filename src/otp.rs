use chrono::{Duration, Local, NaiveDateTime};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rand::Rng;

use crate::auth::ApiError;
use crate::model::{OtpCode, OtpInsert};
use crate::schema::otp_codes::dsl::*;

pub const PURPOSE_LOGIN: &str = "login";
pub const PURPOSE_PASSWORD_RESET: &str = "password_reset";

const DEFAULT_TTL_MINUTES: i64 = 10;

/// Issues and verifies emailed one-time passcodes, keyed by employee id and
/// purpose. Issuing a code invalidates earlier unconsumed ones for the same
/// key; verification is single-use.
#[derive(Clone, Debug)]
pub struct OtpService {
    ttl_minutes: i64,
}

impl OtpService {
    pub fn new(ttl_minutes: i64) -> Self {
        Self { ttl_minutes }
    }

    pub fn from_env() -> Self {
        let ttl = std::env::var("OTP_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_MINUTES);
        Self::new(ttl)
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    pub async fn issue(
        &self,
        conn: &mut AsyncPgConnection,
        employee: i32,
        reason: &str,
    ) -> Result<String, ApiError> {
        diesel::update(
            otp_codes
                .filter(employee_id.eq(employee))
                .filter(purpose.eq(reason))
                .filter(consumed.eq(false)),
        )
        .set(consumed.eq(true))
        .execute(conn)
        .await
        .map_err(|e| {
            tracing::debug!("otp issue (invalidate): {}", e);
            ApiError::Database
        })?;

        let fresh = generate_code(&mut rand::thread_rng());
        let record = OtpInsert {
            employee_id: employee,
            purpose: reason.to_string(),
            code: fresh.clone(),
            expires_at: Local::now().naive_utc() + Duration::minutes(self.ttl_minutes),
        };
        diesel::insert_into(otp_codes)
            .values(&record)
            .execute(conn)
            .await
            .map_err(|e| {
                tracing::debug!("otp issue (insert): {}", e);
                ApiError::Database
            })?;
        Ok(fresh)
    }

    /// Checks a submitted code. With `consume` set the code is marked used
    /// and can never verify again.
    pub async fn verify(
        &self,
        conn: &mut AsyncPgConnection,
        employee: i32,
        reason: &str,
        submitted: &str,
        consume: bool,
    ) -> Result<(), ApiError> {
        let row: Option<OtpCode> = otp_codes
            .filter(employee_id.eq(employee))
            .filter(purpose.eq(reason))
            .filter(code.eq(submitted))
            .filter(consumed.eq(false))
            .order(created_at.desc())
            .select(OtpCode::as_select())
            .first::<OtpCode>(conn)
            .await
            .optional()
            .map_err(|e| {
                tracing::debug!("otp verify: {}", e);
                ApiError::Database
            })?;

        let Some(row) = row else {
            return Err(ApiError::OtpRejected("Code is invalid or already used"));
        };
        if is_expired(row.expires_at, Local::now().naive_utc()) {
            return Err(ApiError::OtpRejected("Code has expired"));
        }

        if consume {
            diesel::update(otp_codes.find(row.otp_id))
                .set(consumed.eq(true))
                .execute(conn)
                .await
                .map_err(|e| {
                    tracing::debug!("otp consume: {}", e);
                    ApiError::Database
                })?;
        }
        Ok(())
    }
}

pub fn generate_code(rng: &mut impl Rng) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000))
}

fn is_expired(deadline: NaiveDateTime, now: NaiveDateTime) -> bool {
    deadline < now
}

#[cfg(test)]
mod tests {
    use super::{generate_code, is_expired};
    use chrono::{Duration, NaiveDate};

    #[test]
    fn generated_codes_are_six_decimal_digits() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn small_values_are_zero_padded() {
        use rand::{rngs::StdRng, SeedableRng};
        for seed in 0..32 {
            let code = generate_code(&mut StdRng::seed_from_u64(seed));
            assert_eq!(code.len(), 6);
        }
    }

    #[test]
    fn expiry_is_exclusive_of_the_deadline_itself() {
        let deadline = NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!(!is_expired(deadline, deadline));
        assert!(is_expired(deadline, deadline + Duration::seconds(1)));
        assert!(!is_expired(deadline, deadline - Duration::seconds(1)));
    }
}
